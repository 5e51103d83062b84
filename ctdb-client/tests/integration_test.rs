/// Integration tests for the Cottontail DB client
///
/// These tests start an in-memory server on a loopback port and drive it
/// through the real gRPC client.

use ctdb_client::expr::{col, lit};
use ctdb_client::{
    BatchInsert, Client, ClientConfig, ClientError, ColumnDef, Direction, IndexDef, IndexType,
    NearestNeighbors, Predicate, Query, Type, Value,
};
use ctdb_test_utils::{MockCottontail, TestServer, TEST_ENTITY, TEST_SCHEMA};

fn config(server: &TestServer) -> ClientConfig {
    ClientConfig::new(server.host(), server.port())
}

async fn connect(server: &TestServer) -> Client {
    Client::connect(config(server)).await.unwrap()
}

async fn connect_in_transaction(server: &TestServer) -> Client {
    Client::connect(config(server).with_transaction(true))
        .await
        .unwrap()
}

fn columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", Type::String),
        ColumnDef::new("value", Type::Integer),
        ColumnDef::new("feature", Type::FloatVec).length(3).nullable(true),
    ]
}

/// Create the test schema and entity
async fn setup(client: &mut Client) {
    client.create_schema(TEST_SCHEMA, false).await.unwrap();
    client
        .create_entity(TEST_SCHEMA, TEST_ENTITY, columns(), false)
        .await
        .unwrap();
}

fn batch(rows: usize) -> BatchInsert {
    (0..rows).fold(
        BatchInsert::new(TEST_SCHEMA, TEST_ENTITY).columns(["id", "value"]),
        |batch, i| batch.row(vec![Value::from(format!("test_{}", i)), Value::Int(i as i32)]),
    )
}

async fn rows(client: &mut Client) -> i64 {
    client
        .entity_details(TEST_SCHEMA, TEST_ENTITY)
        .await
        .unwrap()
        .rows
}

fn ids(records: &[ctdb_client::Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.get("id").and_then(Value::as_str).unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_schema_round_trip() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;

    client.create_schema(TEST_SCHEMA, false).await.unwrap();
    let schemas = client.list_schemas().await.unwrap();
    assert!(schemas.contains(&format!("warren.{}", TEST_SCHEMA)));

    client.drop_schema(TEST_SCHEMA, false).await.unwrap();
    let schemas = client.list_schemas().await.unwrap();
    assert!(!schemas.iter().any(|s| s.ends_with(TEST_SCHEMA)));
}

#[tokio::test]
async fn test_exist_ok_skips_create() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;
    server.service().clear_calls();

    let response = client.create_schema(TEST_SCHEMA, true).await.unwrap();
    assert!(response.is_empty());
    client
        .create_entity(TEST_SCHEMA, TEST_ENTITY, columns(), true)
        .await
        .unwrap();

    assert_eq!(server.service().count_calls("CreateSchema"), 0);
    assert_eq!(server.service().count_calls("CreateEntity"), 0);
    assert_eq!(server.service().count_calls("ListSchemas"), 1);
    assert_eq!(server.service().count_calls("ListEntities"), 1);

    let err = client.create_schema(TEST_SCHEMA, false).await.unwrap_err();
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn test_not_exist_ok_skips_drop() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;

    client.drop_schema("missing", true).await.unwrap();
    assert_eq!(server.service().count_calls("DropSchema"), 0);

    let err = client.drop_schema("missing", false).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_insert_and_details() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;

    client
        .insert(
            TEST_SCHEMA,
            TEST_ENTITY,
            [("id", Value::from("test_0")), ("value", Value::Int(0))],
        )
        .await
        .unwrap();

    let details = client.entity_details(TEST_SCHEMA, TEST_ENTITY).await.unwrap();
    assert_eq!(details.name, "warren.schema_test.entity_test");
    assert_eq!(details.rows, 1);
    assert_eq!(details.columns.len(), 3);
    assert_eq!(details.columns[0].column_type, "STRING");
    assert!(!details.columns[0].nullable);
    assert_eq!(details.columns[2].size, 3);
    assert!(details.columns[2].nullable);
}

#[tokio::test]
async fn test_batch_insert_and_count() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;

    let response = client.insert_batch(batch(7)).await.unwrap();
    assert_eq!(response[0].get("inserted"), Some(&Value::Long(7)));
    assert_eq!(rows(&mut client).await, 7);
    assert_eq!(client.count(TEST_SCHEMA, TEST_ENTITY).await.unwrap(), 7);
}

#[tokio::test]
async fn test_ragged_batch_is_rejected_locally() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;

    let ragged = BatchInsert::new(TEST_SCHEMA, TEST_ENTITY)
        .columns(["id", "value"])
        .row(vec![Value::from("test_0")]);
    let err = client.insert_batch(ragged).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert_eq!(server.service().count_calls("InsertBatch"), 0);
}

#[tokio::test]
async fn test_delete_all() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;
    client.insert_batch(batch(5)).await.unwrap();

    let response = client
        .delete(TEST_SCHEMA, TEST_ENTITY, Predicate::always(true))
        .await
        .unwrap();
    assert_eq!(response[0].get("deleted"), Some(&Value::Long(5)));
    assert_eq!(rows(&mut client).await, 0);
}

#[tokio::test]
async fn test_delete_with_predicate() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;
    client.insert_batch(batch(5)).await.unwrap();

    client
        .delete(TEST_SCHEMA, TEST_ENTITY, col("value").lt(lit(2)))
        .await
        .unwrap();
    let remaining = client.query(Query::scan(TEST_SCHEMA, TEST_ENTITY)).await.unwrap();
    assert_eq!(ids(&remaining), vec!["test_2", "test_3", "test_4"]);
}

#[tokio::test]
async fn test_update() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;
    client.insert_batch(batch(3)).await.unwrap();

    client
        .update(
            TEST_SCHEMA,
            TEST_ENTITY,
            col("id").eq(lit("test_1")),
            [("value", lit(100))],
        )
        .await
        .unwrap();

    let records = client
        .query(Query::scan(TEST_SCHEMA, TEST_ENTITY).filter(col("value").eq(lit(100))))
        .await
        .unwrap();
    assert_eq!(ids(&records), vec!["test_1"]);
}

#[tokio::test]
async fn test_query_projection_order_and_limit() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;
    client.insert_batch(batch(6)).await.unwrap();

    let query = Query::scan(TEST_SCHEMA, TEST_ENTITY)
        .select(col("id"))
        .select_as(col("value"), "v")
        .filter(col("value").ge(lit(2)))
        .order_by("v", Direction::Descending)
        .limit(3);
    let records = client.query(query).await.unwrap();

    assert_eq!(ids(&records), vec!["test_5", "test_4", "test_3"]);
    assert_eq!(records[0].columns().collect::<Vec<_>>(), vec!["id", "v"]);
}

#[tokio::test]
async fn test_multi_message_stream_is_concatenated() {
    let server = TestServer::start_with(MockCottontail::with_chunk_size(2)).await;
    let mut client = connect(&server).await;
    setup(&mut client).await;
    client.insert_batch(batch(5)).await.unwrap();

    let records = client.query(Query::scan(TEST_SCHEMA, TEST_ENTITY)).await.unwrap();
    assert_eq!(
        ids(&records),
        vec!["test_0", "test_1", "test_2", "test_3", "test_4"]
    );
}

#[tokio::test]
async fn test_sample_limit_and_skip() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;
    client.insert_batch(batch(5)).await.unwrap();

    let records = client.sample(TEST_SCHEMA, TEST_ENTITY, 2, 1).await.unwrap();
    assert_eq!(ids(&records), vec!["test_1", "test_2"]);
    assert_eq!(records[0].len(), 3);

    // A zero limit cannot be told apart from "no limit" on the wire
    let err = client.sample(TEST_SCHEMA, TEST_ENTITY, 0, 0).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert_eq!(server.service().count_calls("Query"), 1);
}

#[tokio::test]
async fn test_nearest_neighbors() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;

    let features = [
        ("far", vec![0.0f32, 0.0, 1.0]),
        ("near", vec![1.0f32, 0.0, 0.0]),
        ("mid", vec![0.5f32, 0.5, 0.0]),
    ];
    for (id, feature) in features {
        client
            .insert(
                TEST_SCHEMA,
                TEST_ENTITY,
                [
                    ("id", Value::from(id)),
                    ("value", Value::Int(0)),
                    ("feature", Value::from(feature)),
                ],
            )
            .await
            .unwrap();
    }

    let query = vec![1.0f32, 0.0, 0.0];
    let nearest = client
        .nearest_neighbors(
            NearestNeighbors::new(TEST_SCHEMA, TEST_ENTITY, "feature", query.clone(), "id").limit(1),
        )
        .await
        .unwrap();
    assert_eq!(ids(&nearest), vec!["near"]);

    let all = client
        .nearest_neighbors(NearestNeighbors::new(
            TEST_SCHEMA,
            TEST_ENTITY,
            "feature",
            query,
            "id",
        ))
        .await
        .unwrap();
    assert_eq!(ids(&all), vec!["near", "mid", "far"]);

    let distances: Vec<f64> = all
        .iter()
        .map(|r| r.get("distance").and_then(Value::as_f64).unwrap())
        .collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_transaction_rollback_restores() {
    let server = TestServer::start().await;
    let mut plain = connect(&server).await;
    setup(&mut plain).await;

    let mut client = connect_in_transaction(&server).await;
    assert!(client.in_transaction());
    client.insert_batch(batch(2)).await.unwrap();

    // Visible inside the transaction only
    assert_eq!(rows(&mut client).await, 2);
    assert_eq!(rows(&mut plain).await, 0);

    client.abort_transaction().await.unwrap();
    assert!(!client.in_transaction());
    assert_eq!(rows(&mut client).await, 0);
    assert!(server.service().open_transactions().is_empty());
}

#[tokio::test]
async fn test_transaction_commit_persists() {
    let server = TestServer::start().await;
    let mut plain = connect(&server).await;
    setup(&mut plain).await;

    let mut client = connect(&server).await;
    let tx = client.start_transaction().await.unwrap();
    assert_eq!(client.transaction_id(), Some(tx));
    client.insert_batch(batch(3)).await.unwrap();
    client.commit_transaction().await.unwrap();

    assert_eq!(rows(&mut plain).await, 3);
}

#[tokio::test]
async fn test_requests_carry_transaction_id() {
    let server = TestServer::start().await;
    let mut client = connect_in_transaction(&server).await;
    let tx = client.transaction_id().unwrap();

    client.list_schemas().await.unwrap();
    let last = server.service().calls().pop().unwrap();
    assert_eq!(last.rpc, "ListSchemas");
    assert_eq!(last.tx_id, Some(tx));

    let transactions = client.list_transactions().await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].get("txId"), Some(&Value::Long(tx)));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_transaction_preconditions_are_local() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;

    assert!(matches!(
        client.commit_transaction().await,
        Err(ClientError::NoTransaction)
    ));
    assert!(matches!(
        client.abort_transaction().await,
        Err(ClientError::NoTransaction)
    ));
    assert_eq!(server.service().count_calls("Commit"), 0);
    assert_eq!(server.service().count_calls("Rollback"), 0);

    let tx = client.start_transaction().await.unwrap();
    match client.start_transaction().await {
        Err(ClientError::TransactionAlreadyRunning(id)) => assert_eq!(id, tx),
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
    assert_eq!(server.service().count_calls("Begin"), 1);

    client.kill_transaction().await.unwrap();
    assert!(server.service().open_transactions().is_empty());
}

#[tokio::test]
async fn test_with_session_commits_on_exit() {
    let server = TestServer::start().await;
    let mut plain = connect(&server).await;
    setup(&mut plain).await;

    Client::with_session(config(&server).with_transaction(true), |client| {
        Box::pin(async move {
            client.insert_batch(batch(4)).await?;
            Ok(())
        })
    })
    .await
    .unwrap();

    assert_eq!(rows(&mut plain).await, 4);
    assert!(server.service().open_transactions().is_empty());
}

#[tokio::test]
async fn test_with_session_closes_after_error() {
    let server = TestServer::start().await;

    let result: ctdb_client::Result<()> =
        Client::with_session(config(&server).with_transaction(true), |client| {
            Box::pin(async move {
                client.drop_schema("missing", false).await?;
                Ok(())
            })
        })
        .await;

    assert!(result.unwrap_err().is_not_found());
    assert_eq!(server.service().count_calls("Commit"), 1);
    assert!(server.service().open_transactions().is_empty());
}

#[tokio::test]
async fn test_with_session_keeps_body_error_when_commit_fails() {
    let server = TestServer::start().await;
    let service = server.service().clone();

    let result: ctdb_client::Result<()> =
        Client::with_session(config(&server).with_transaction(true), move |client| {
            Box::pin(async move {
                let tx = client.transaction_id().unwrap();
                service.abort_transaction(tx).unwrap();
                Err(ClientError::InvalidArgument("bad input".to_string()))
            })
        })
        .await;

    // The commit on close was attempted and rejected; the body's error wins
    assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    assert_eq!(server.service().count_calls("Commit"), 1);
    assert!(server.service().open_transactions().is_empty());
}

#[tokio::test]
async fn test_close_reports_rejected_commit() {
    let server = TestServer::start().await;
    let mut client = Client::connect(config(&server).with_transaction(true))
        .await
        .unwrap();
    let tx = client.transaction_id().unwrap();
    server.service().abort_transaction(tx).unwrap();

    let err = client.close().await.unwrap_err();
    assert_eq!(err.code(), Some(tonic::Code::FailedPrecondition));
}

#[tokio::test]
async fn test_entity_maintenance() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;
    client.insert_batch(batch(3)).await.unwrap();

    let entities = client.list_entities(TEST_SCHEMA).await.unwrap();
    assert_eq!(entities, vec!["warren.schema_test.entity_test"]);

    client.analyze_entity(TEST_SCHEMA, TEST_ENTITY).await.unwrap();
    assert_eq!(server.service().count_calls("AnalyzeEntity"), 1);
    assert_eq!(rows(&mut client).await, 3);

    client.truncate_entity(TEST_SCHEMA, TEST_ENTITY).await.unwrap();
    assert_eq!(server.service().count_calls("TruncateEntity"), 1);
    assert_eq!(rows(&mut client).await, 0);

    client.drop_entity(TEST_SCHEMA, TEST_ENTITY, false).await.unwrap();
    assert!(client.list_entities(TEST_SCHEMA).await.unwrap().is_empty());
    client.drop_entity(TEST_SCHEMA, TEST_ENTITY, true).await.unwrap();
}

#[tokio::test]
async fn test_index_lifecycle() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;

    client
        .create_index(
            TEST_SCHEMA,
            TEST_ENTITY,
            IndexDef::new("idx_id", IndexType::Hash).column("id"),
        )
        .await
        .unwrap();
    let details = client.entity_details(TEST_SCHEMA, TEST_ENTITY).await.unwrap();
    assert_eq!(details.indexes.len(), 1);
    assert_eq!(details.indexes[0].index_type, "HASH");

    client.rebuild_index(TEST_SCHEMA, TEST_ENTITY, "idx_id").await.unwrap();
    client.drop_index(TEST_SCHEMA, TEST_ENTITY, "idx_id").await.unwrap();

    let err = client
        .rebuild_index(TEST_SCHEMA, TEST_ENTITY, "idx_id")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_explain_and_ping() {
    let server = TestServer::start().await;
    let mut client = connect(&server).await;
    setup(&mut client).await;

    client.ping().await.unwrap();
    let plan = client
        .explain(Query::scan(TEST_SCHEMA, TEST_ENTITY))
        .await
        .unwrap();
    assert!(!plan.is_empty());
    assert_eq!(server.service().count_calls("Query"), 0);
}

#[tokio::test]
async fn test_connection_refused() {
    // Reserve a port, then release it so nothing listens there
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = Client::connect(ClientConfig::new("127.0.0.1", port)).await;
    assert!(matches!(result, Err(ClientError::ConnectionError(_))));
}
