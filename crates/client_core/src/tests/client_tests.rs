use super::*;
use std::{collections::BTreeMap, sync::Arc};

use axum::{extract::Query, routing::get, routing::post, Json, Router};
use shared::domain::{AccountId, Role};
use shared::protocol::FILTER_ALL;
use tokio::sync::Mutex;

type SeenParams = Arc<Mutex<Option<BTreeMap<String, String>>>>;

async fn spawn_server() -> (String, SeenParams) {
    let seen: SeenParams = Arc::new(Mutex::new(None));
    let recorded = seen.clone();

    let app = Router::new()
        .route(
            "/login",
            post(|Json(_request): Json<LoginRequest>| async move {
                Json(serde_json::json!({
                    "account_id": 7,
                    "role": "admin",
                }))
            }),
        )
        .route(
            "/medicines",
            get(move |Query(params): Query<BTreeMap<String, String>>| {
                let recorded = recorded.clone();
                async move {
                    let request = PageRequest::from_query_pairs(params.clone());
                    *recorded.lock().await = Some(params);
                    Json(PageResult::<MedicineSummary>::new(
                        Vec::new(),
                        request.page,
                        request.limit,
                        0,
                    ))
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), seen)
}

#[tokio::test]
async fn login_fills_the_session_state() {
    let (server_url, _seen) = spawn_server().await;
    let mut client = PortalClient::new(server_url);
    let session = client.login("admin").await.expect("login");
    assert_eq!(session.account_id, AccountId(7));
    assert_eq!(client.state.role, Some(Role::Admin));
    assert!(client.can_view(Capability::ViewInventory));
    assert!(!client.can_view(Capability::RecordClinical));
}

#[tokio::test]
async fn page_fetches_carry_the_actor_and_drop_sentinels() {
    let (server_url, seen) = spawn_server().await;
    let mut client = PortalClient::new(server_url);
    client.login("admin").await.expect("login");

    let mut query = ListQuery::new();
    query.set_search("amox");
    query.toggle_sort("name");
    query.set_filter("category_id", FILTER_ALL);
    query.set_limit(25);
    query.set_page(2);

    let page = client.list_medicines(&query).await.expect("page");
    assert_eq!(page.page, 2);
    assert_eq!(page.page_size, 25);
    assert_eq!(page.total_pages, 0);

    let params = seen.lock().await.clone().expect("request seen");
    assert_eq!(params.get("account_id").map(String::as_str), Some("7"));
    assert_eq!(params.get("page").map(String::as_str), Some("2"));
    assert_eq!(params.get("limit").map(String::as_str), Some("25"));
    assert_eq!(params.get("search").map(String::as_str), Some("amox"));
    assert_eq!(params.get("sort_by").map(String::as_str), Some("name"));
    assert_eq!(params.get("sort_order").map(String::as_str), Some("asc"));
    assert!(!params.contains_key("category_id"));
}

#[tokio::test]
async fn unauthenticated_fetches_fail_fast() {
    let (server_url, _seen) = spawn_server().await;
    let client = PortalClient::new(server_url);
    let err = client
        .list_medicines(&ListQuery::new())
        .await
        .expect_err("should fail");
    assert!(err.to_string().contains("not logged in"));
}

#[tokio::test]
async fn remote_source_honours_the_page_source_contract() {
    let (server_url, _seen) = spawn_server().await;
    let mut client = PortalClient::new(server_url);
    client.login("admin").await.expect("login");

    let source: RemoteSource<'_, MedicineSummary> = RemoteSource::new(&client, "/medicines");
    let page = source
        .fetch_page(&ListQuery::new().request())
        .await
        .expect("page");
    assert_eq!(page.total_items, 0);
    assert_eq!(page.total_pages, 0);
}
