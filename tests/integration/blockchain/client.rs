use alloy::primitives::{Address, B256};
use mockall::predicate;
use serde_json::json;
use std::{str::FromStr, sync::Arc, time::Duration};

use rpc_sentinel::{
	models::LogQuery,
	services::blockchain::{EvmClient, EvmClientTrait, TransportError},
};

use crate::integration::mocks::{
	rpc_error, rpc_result, transfer_log, MockNodeTransport, TOKEN, TRANSFER_TOPIC,
};

const NODE: &str = "http://node";

fn create_client(transport: MockNodeTransport) -> EvmClient<MockNodeTransport> {
	EvmClient::new(Arc::new(transport), Duration::from_secs(5))
}

fn transfer_query() -> LogQuery {
	LogQuery::new(
		Address::from_str(TOKEN).unwrap(),
		B256::from_str(TRANSFER_TOPIC).unwrap(),
	)
}

#[tokio::test]
async fn test_block_number() {
	let mut transport = MockNodeTransport::new();
	transport
		.expect_send_raw_request()
		.with(
			predicate::eq(NODE),
			predicate::eq("eth_blockNumber"),
			predicate::always(),
		)
		.times(1)
		.returning(|_, _, _| Ok(rpc_result(json!("0x1b4"))));

	let client = create_client(transport);
	assert_eq!(client.block_number(NODE).await.unwrap(), 436);
}

#[tokio::test]
async fn test_get_logs_sends_range_and_parses_logs() {
	let mut transport = MockNodeTransport::new();
	transport
		.expect_send_raw_request()
		.withf(|url, method, params| {
			let query = &params.as_ref().unwrap()[0];
			url == NODE
				&& method == "eth_getLogs"
				&& query["fromBlock"] == json!("0xa")
				&& query["toBlock"] == json!("0xe")
				&& query["topics"][0] == json!(TRANSFER_TOPIC)
		})
		.times(1)
		.returning(|_, _, _| Ok(rpc_result(json!([transfer_log(12)]))));

	let client = create_client(transport);
	let logs = client
		.get_logs(NODE, &transfer_query().with_range(10, 14))
		.await
		.unwrap();

	assert_eq!(logs.len(), 1);
	assert_eq!(logs[0].block_number, Some(12));
	assert_eq!(logs[0].address(), Address::from_str(TOKEN).unwrap());
}

#[tokio::test]
async fn test_filter_lifecycle() {
	let mut transport = MockNodeTransport::new();
	transport
		.expect_send_raw_request()
		.with(
			predicate::always(),
			predicate::eq("eth_newFilter"),
			predicate::always(),
		)
		.returning(|_, _, _| Ok(rpc_result(json!("0xfeed"))));
	transport
		.expect_send_raw_request()
		.with(
			predicate::always(),
			predicate::eq("eth_getFilterChanges"),
			predicate::eq(Some(json!(["0xfeed"]))),
		)
		.returning(|_, _, _| Ok(rpc_result(json!([transfer_log(7), transfer_log(8)]))));
	transport
		.expect_send_raw_request()
		.with(
			predicate::always(),
			predicate::eq("eth_uninstallFilter"),
			predicate::eq(Some(json!(["0xfeed"]))),
		)
		.returning(|_, _, _| Ok(rpc_result(json!(true))));

	let client = create_client(transport);
	let filter_id = client.new_filter(NODE, &transfer_query()).await.unwrap();
	assert_eq!(filter_id, "0xfeed");

	let changes = client.get_filter_changes(NODE, &filter_id).await.unwrap();
	assert_eq!(changes.len(), 2);

	assert!(client.uninstall_filter(NODE, &filter_id).await.unwrap());
}

#[tokio::test]
async fn test_node_errors_are_classified() {
	let mut transport = MockNodeTransport::new();
	transport
		.expect_send_raw_request()
		.with(
			predicate::always(),
			predicate::eq("eth_newFilter"),
			predicate::always(),
		)
		.returning(|_, _, _| {
			Ok(rpc_error(
				-32000,
				"the method eth_newFilter does not exist/is not available",
			))
		});
	transport
		.expect_send_raw_request()
		.with(
			predicate::always(),
			predicate::eq("eth_getFilterChanges"),
			predicate::always(),
		)
		.returning(|_, _, _| Ok(rpc_error(-32000, "filter not found")));

	let client = create_client(transport);
	assert!(matches!(
		client.new_filter(NODE, &transfer_query()).await,
		Err(TransportError::UnsupportedMethod(_))
	));
	assert!(matches!(
		client.get_filter_changes(NODE, "0x1").await,
		Err(TransportError::FilterNotFound(_))
	));
}

#[tokio::test]
async fn test_malformed_results_are_parse_errors() {
	let mut transport = MockNodeTransport::new();
	transport
		.expect_send_raw_request()
		.returning(|_, _, _| Ok(rpc_result(json!({"unexpected": true}))));

	let client = create_client(transport);
	assert!(matches!(
		client.block_number(NODE).await,
		Err(TransportError::ResponseParse(_))
	));
	assert!(matches!(
		client.new_filter(NODE, &transfer_query()).await,
		Err(TransportError::ResponseParse(_))
	));
}

#[tokio::test]
async fn test_transport_errors_propagate() {
	let mut transport = MockNodeTransport::new();
	transport
		.expect_send_raw_request()
		.times(1)
		.returning(|_, _, _| Err(TransportError::Network("connection refused".to_string())));

	let client = create_client(transport);
	let error = client.block_number(NODE).await.unwrap_err();
	assert!(error.is_connection_level());
}
