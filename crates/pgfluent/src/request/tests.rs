use super::*;
use crate::test_support::{MockConnection, MockProvider, longs};
use crate::value::SqlValue;

type Mock<'a, T> = RequestBuilder<'a, T, MockConnection>;

#[tokio::test]
async fn execute_with_provider_binds_added_params() {
    let conn = MockConnection::new().then_rows(longs("count", &[3]));
    let provider = MockProvider::new(conn.clone());

    let count = RequestBuilder::returning_long()
        .with_connection_provider(&provider)
        .with_sql("SELECT count(*) FROM orders WHERE customer_id = $1 AND paid = $2")
        .add_param(42_i64)
        .add_param(true)
        .execute()
        .await;

    assert_eq!(count, Some(3));
    assert_eq!(provider.connects(), 1);
    assert_eq!(conn.bound(), vec![vec!["42", "true"]]);
}

#[tokio::test]
async fn builders_branch_without_interfering() {
    let conn = MockConnection::new();
    let base = RequestBuilder::returning_void()
        .with_connection(&conn)
        .with_sql("UPDATE users SET name = $2 WHERE id = $1")
        .add_param(1_i64);

    let ann = base.add_param("ann");
    let bob = base.add_param("bob");
    bob.execute().await;
    ann.execute().await;
    ann.execute().await;

    assert_eq!(
        conn.bound(),
        vec![vec!["1", "'bob'"], vec!["1", "'ann'"], vec!["1", "'ann'"]]
    );
}

#[tokio::test]
async fn provider_wins_over_connection() {
    let explicit = MockConnection::new();
    let provided = MockConnection::new().then_rows(longs("n", &[1]));
    let provider = MockProvider::new(provided.clone());

    let value = RequestBuilder::returning_long()
        .with_connection(&explicit)
        .with_connection_provider(&provider)
        .with_sql("SELECT 1")
        .execute()
        .await;

    assert_eq!(value, Some(1));
    assert_eq!(explicit.run_count(), 0);
    assert_eq!(provided.run_count(), 1);
}

#[tokio::test]
async fn execute_rejects_several_parameter_sets() {
    let conn = MockConnection::new();
    let errors = ErrorCollector::new();

    let value = RequestBuilder::returning_long()
        .with_connection(&conn)
        .with_error_collector(&errors)
        .with_sql("SELECT $1::int8")
        .add_param(1_i64)
        .next_param_set()
        .add_param(2_i64)
        .execute()
        .await;

    assert_eq!(value, None);
    assert_eq!(conn.run_count(), 0);
    assert_eq!(errors.len(), 1);
    assert!(errors.messages()[0].contains("use execute_multiple()"));
}

#[tokio::test]
async fn missing_connection_or_sql_is_a_configuration_error() {
    let errors = ErrorCollector::new();

    let no_conn = Mock::<i64>::returning_long()
        .with_error_collector(&errors)
        .with_sql("SELECT 1");
    assert_eq!(no_conn.execute().await, None);
    assert!(no_conn.execute_multiple().await.is_empty());

    let conn = MockConnection::new();
    let no_sql = Mock::<i64>::returning_long()
        .with_error_collector(&errors)
        .with_connection(&conn);
    assert_eq!(no_sql.execute().await, None);

    let taken = errors.take();
    assert_eq!(taken.len(), 3);
    assert!(taken.iter().all(FluentError::is_configuration));
    assert_eq!(
        taken[0].to_string(),
        "Configuration error: no connection provided for request: sql=SELECT 1"
    );
    assert_eq!(conn.run_count(), 0);
}

#[tokio::test]
async fn execute_multiple_runs_explicit_then_pending_sets() {
    let conn = MockConnection::new();
    let explicit = [1_i64, 2]
        .map(|id| ArgumentSetterBuilder::new().add(id).add("x").build());

    let values = RequestBuilder::returning_void()
        .with_connection(&conn)
        .with_sql("INSERT INTO t (id, name) VALUES ($1, $2)")
        .with_argument_setters(explicit)
        .add_param(3_i64)
        .add_param("y")
        .execute_multiple()
        .await;

    assert!(values.is_empty());
    assert_eq!(
        conn.bound(),
        vec![vec!["1", "'x'"], vec!["2", "'x'"], vec!["3", "'y'"]]
    );
    assert_eq!(conn.prepared().len(), 1);
}

#[tokio::test]
async fn execute_multiple_collects_deferred_errors() {
    let conn = MockConnection::new()
        .then_rows(longs("id", &[1]))
        .then_fail("orders_pkey: duplicate key")
        .then_rows(longs("id", &[3]));
    let errors = ErrorCollector::new();

    let ids = RequestBuilder::returning_long()
        .with_connection(&conn)
        .with_error_collector(&errors)
        .with_sql("INSERT INTO orders (id) VALUES ($1) RETURNING id")
        .add_param(1_i64)
        .next_param_set()
        .add_param(1_i64)
        .next_param_set()
        .add_param(3_i64)
        .execute_multiple()
        .await;

    assert_eq!(ids, vec![Some(1), Some(3)]);
    assert_eq!(errors.len(), 1);
    assert!(errors.take()[0].is_unique_violation());
}

#[tokio::test]
async fn failing_single_execution_is_collected() {
    let conn = MockConnection::new().then_fail("dup");
    let provider = MockProvider::failing();
    let errors = ErrorCollector::new();

    let on_conn = Mock::<i64>::returning_long()
        .with_connection(&conn)
        .with_error_collector(&errors)
        .with_sql("SELECT 1");
    assert_eq!(on_conn.execute().await, None);

    let on_provider = on_conn.with_connection_provider(&provider);
    assert!(on_provider.execute_multiple().await.is_empty());

    let taken = errors.take();
    assert_eq!(taken.len(), 2);
    assert!(taken[0].is_unique_violation());
    assert!(matches!(taken[1], FluentError::Connection(_)));
}

#[tokio::test]
async fn connection_reader_reuses_the_connection() {
    let conn = MockConnection::new()
        .then_rows(longs("customer_id", &[9]))
        .then_rows(ResultSet::new(["name"]).with_row(vec![SqlValue::Text("Ann".into())]).unwrap());

    let name = RequestBuilder::returning_string()
        .with_connection(&conn)
        .with_sql("SELECT customer_id FROM orders WHERE id = $1")
        .add_param(100_i64)
        .with_connection_reader(|mut rs: ResultSet, conn: &MockConnection| {
            let customer = rs.next_row().map(|row| row.get::<i64>(0));
            Box::pin(async move {
                let Some(customer) = customer.transpose()? else {
                    return Ok(None);
                };
                Ok(RequestBuilder::returning_string()
                    .with_connection(conn)
                    .with_sql("SELECT name FROM customers WHERE id = $1")
                    .add_param(customer)
                    .execute()
                    .await)
            }) as BoxFuture<'_, FluentResult<Option<String>>>
        })
        .execute()
        .await;

    assert_eq!(name.as_deref(), Some("Ann"));
    assert_eq!(conn.bound(), vec![vec!["100"], vec!["9"]]);
}

fn customer_name_reader() -> Reader<String, MockConnection> {
    ConnectionReader::new(|mut rs: ResultSet, conn: &MockConnection| {
        let customer = rs.next_row().map(|row| row.get::<i64>(0));
        Box::pin(async move {
            let Some(customer) = customer.transpose()? else {
                return Ok(None);
            };
            Ok(RequestBuilder::returning_string()
                .with_connection(conn)
                .with_sql("SELECT name FROM customers WHERE id = $1")
                .add_param(customer)
                .execute()
                .await)
        }) as BoxFuture<'_, FluentResult<Option<String>>>
    })
    .into()
}

fn names(values: &[&str]) -> ResultSet {
    let mut rs = ResultSet::new(["name"]);
    for v in values {
        rs.push_row(vec![SqlValue::Text((*v).to_string())]).unwrap();
    }
    rs
}

#[tokio::test]
async fn connection_reader_through_provider() {
    let conn = MockConnection::new()
        .then_rows(longs("customer_id", &[9]))
        .then_rows(names(&["Ann"]));
    let provider = MockProvider::new(conn.clone());

    let name = RequestBuilder::returning_string()
        .with_connection_provider(&provider)
        .with_sql("SELECT customer_id FROM orders WHERE id = $1")
        .add_param(100_i64)
        .with_reader(customer_name_reader())
        .execute()
        .await;

    assert_eq!(name.as_deref(), Some("Ann"));
    assert_eq!(provider.connects(), 1);
    assert_eq!(conn.bound(), vec![vec!["100"], vec!["9"]]);
}

#[tokio::test]
async fn connection_reader_through_provider_for_every_set() {
    let conn = MockConnection::new()
        .then_rows(longs("customer_id", &[9]))
        .then_rows(names(&["Ann"]))
        .then_fail("lock timeout")
        .then_rows(longs("customer_id", &[11]))
        .then_rows(names(&["Cid"]));
    let provider = MockProvider::new(conn.clone());
    let errors = ErrorCollector::new();

    let found = RequestBuilder::returning_string()
        .with_connection_provider(&provider)
        .with_error_collector(&errors)
        .with_sql("SELECT customer_id FROM orders WHERE id = $1")
        .add_param(100_i64)
        .next_param_set()
        .add_param(101_i64)
        .next_param_set()
        .add_param(102_i64)
        .with_reader(customer_name_reader())
        .execute_multiple()
        .await;

    assert_eq!(found, vec![Some("Ann".to_string()), Some("Cid".to_string())]);
    assert_eq!(provider.connects(), 1);
    assert_eq!(
        conn.bound(),
        vec![vec!["100"], vec!["9"], vec!["101"], vec!["102"], vec!["11"]]
    );
    assert_eq!(errors.len(), 1);
}

#[tokio::test]
async fn list_and_set_readers() {
    let conn = MockConnection::new()
        .then_rows(longs("id", &[1, 2, 2]))
        .then_rows(longs("id", &[1, 2, 2]));

    let list = RequestBuilder::returning_list_of()
        .with_connection(&conn)
        .with_sql("SELECT id FROM t")
        .with_result_reader(|rs| {
            rs.rows()
                .iter()
                .map(|row| row.get::<i64>(0))
                .collect::<FluentResult<Vec<_>>>()
                .map(Some)
        })
        .execute()
        .await;
    assert_eq!(list, Some(vec![1, 2, 2]));

    let set = RequestBuilder::returning_set_of()
        .with_connection(&conn)
        .with_sql("SELECT id FROM t")
        .with_result_reader(|rs| {
            rs.rows()
                .iter()
                .map(|row| row.get::<i64>(0))
                .collect::<FluentResult<HashSet<_>>>()
                .map(Some)
        })
        .execute()
        .await;
    assert_eq!(set, Some(HashSet::from([1, 2])));
}

#[tokio::test]
async fn typed_json_and_null_params_reach_the_connection() {
    let conn = MockConnection::new();

    RequestBuilder::returning_void()
        .with_connection(&conn)
        .with_sql("INSERT INTO docs (body, meta, score, note) VALUES ($1, $2, $3, $4)")
        .add_pg_json_param(r#"{"a": 1}"#)
        .add_pg_json_param_opt(None)
        .add_typed_param(2.5_f32, Type::FLOAT4)
        .add_null_param(Type::TEXT)
        .execute()
        .await;

    assert_eq!(
        conn.bound(),
        vec![vec![r#"{"a": 1}"#, "null", "2.5", "null"]]
    );
}

#[test]
fn debug_output_summarizes_the_builder() {
    let builder = Mock::<()>::returning_void()
        .with_sql("DELETE FROM t")
        .add_param(1);
    let rendered = format!("{builder:?}");
    assert!(rendered.contains("DELETE FROM t"));
    assert!(rendered.contains("pending_params: Some(1)"));
}
