use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use actix_http::Request;
use actix_web::{
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test, web, App, Error,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use hearth_core::{GenerationParameters, GenerationRequest, DEFAULT_INSTRUCTION};
use hearth_llm::{
    FragmentStream, InferenceConfig, InferenceProvider, LLMChunk, LocalInferenceClient,
    RetryPolicy,
};
use tokio::sync::Notify;
use hearth_server::{app_config, AppState};
use hearth_store::SqliteChatStore;

const USER: (&str, &str) = ("X-User-Id", "alice");

const SSE_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"This \"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"is \"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"a \"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"test.\"}}]}\n\n",
    "data: [DONE]\n\n",
);

struct TestEnv {
    _dir: TempDir,
    store: SqliteChatStore,
    mock_server: MockServer,
}

async fn setup_test_environment() -> (
    impl Service<Request, Response = ServiceResponse, Error = Error>,
    TestEnv,
) {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("temp dir");
    let store = SqliteChatStore::new(dir.path().join("chat.db"));
    store.init().await.expect("init store");

    let inference = InferenceConfig::default()
        .with_base_url(mock_server.uri())
        .with_api_key("test-key")
        .with_retry(RetryPolicy::new(3, Duration::from_millis(5)));
    let client = LocalInferenceClient::new(inference).expect("client");
    let app = init_app(store.clone(), Arc::new(client)).await;

    (
        app,
        TestEnv {
            _dir: dir,
            store,
            mock_server,
        },
    )
}

async fn init_app(
    store: SqliteChatStore,
    llm: Arc<dyn InferenceProvider>,
) -> impl Service<Request, Response = ServiceResponse, Error = Error> {
    let state = web::Data::new(AppState::new(
        store,
        llm,
        GenerationParameters::default(),
        DEFAULT_INSTRUCTION,
    ));
    test::init_service(App::new().app_data(state).configure(app_config)).await
}

/// Emits one fragment, signals, then never finishes.
struct StallingProvider {
    first_fragment_taken: Arc<Notify>,
}

#[async_trait]
impl InferenceProvider for StallingProvider {
    fn generate_stream(&self, _request: GenerationRequest) -> FragmentStream {
        let first_fragment_taken = self.first_fragment_taken.clone();
        Box::pin(async_stream::stream! {
            yield Ok::<_, hearth_llm::LLMError>(LLMChunk::Token("Partial ".to_string()));
            first_fragment_taken.notify_one();
            futures::future::pending::<()>().await;
        })
    }

    async fn list_models(&self) -> hearth_llm::Result<Value> {
        Ok(json!({"data": []}))
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "stalling-model"
    }
}

async fn mount_healthy_inference(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"object": "list", "data": [{"id": "local-model"}]})),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(SSE_BODY),
        )
        .mount(server)
        .await;
}

async fn create_conversation<S>(app: &S) -> String
where
    S: Service<Request, Response = ServiceResponse, Error = Error>,
{
    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(USER)
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    body["id"].as_str().unwrap().to_string()
}

fn message_id_of(resp: &ServiceResponse) -> i64 {
    resp.headers()
        .get("x-message-id")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap()
}

async fn stop_status<S>(app: &S, message_id: i64) -> StatusCode
where
    S: Service<Request, Response = ServiceResponse, Error = Error>,
{
    let req = test::TestRequest::post()
        .uri(&format!("/api/chat/{}/stop", message_id))
        .insert_header(USER)
        .to_request();
    test::call_service(app, req).await.status()
}

fn data_lines(body: &[u8]) -> Vec<String> {
    String::from_utf8(body.to_vec())
        .unwrap()
        .split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| frame.strip_prefix("data: ").unwrap().to_string())
        .collect()
}

#[actix_web::test]
async fn requests_without_user_header_are_rejected() {
    let (app, _env) = setup_test_environment().await;

    let req = test::TestRequest::get()
        .uri("/api/conversations")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "authentication_error");
}

#[actix_web::test]
async fn conversation_crud_round_trip() {
    let (app, _env) = setup_test_environment().await;
    let id = create_conversation(&app).await;

    let req = test::TestRequest::put()
        .uri(&format!("/api/conversations/{}", id))
        .insert_header(USER)
        .set_json(json!({"title": "Weekend trip"}))
        .to_request();
    let renamed: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(renamed["title"], "Weekend trip");

    let req = test::TestRequest::get()
        .uri("/api/conversations")
        .insert_header(USER)
        .to_request();
    let list: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["title"], "Weekend trip");

    let req = test::TestRequest::get()
        .uri(&format!("/api/conversations/{}", id))
        .insert_header(("X-User-Id", "bob"))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );

    let req = test::TestRequest::delete()
        .uri(&format!("/api/conversations/{}", id))
        .insert_header(USER)
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NO_CONTENT
    );

    let req = test::TestRequest::get()
        .uri(&format!("/api/conversations/{}", id))
        .insert_header(USER)
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn chat_streams_progress_tokens_and_done_then_persists() {
    let (app, env) = setup_test_environment().await;
    mount_healthy_inference(&env.mock_server).await;
    let id = create_conversation(&app).await;

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .insert_header(USER)
        .set_json(json!({"message": "Tell me something", "conversation_id": id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    let message_id: i64 = resp
        .headers()
        .get("x-message-id")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let body = test::read_body(resp).await;
    let lines = data_lines(&body);
    assert_eq!(
        lines[0],
        r#"{"progress":"Processing conversation context..."}"#
    );
    assert!(lines[1].starts_with(r#"{"progress":"Processing "#));
    assert!(lines[1].ends_with(r#" estimated tokens..."}"#));
    assert_eq!(
        &lines[2..],
        &[
            r#"{"token":"This "}"#.to_string(),
            r#"{"token":"is "}"#.to_string(),
            r#"{"token":"a "}"#.to_string(),
            r#"{"token":"test."}"#.to_string(),
            "[DONE]".to_string(),
        ]
    );

    let detail = env.store.get_conversation("alice", &id).await.unwrap();
    assert_eq!(detail.conversation.title, "Tell me something");
    let message = &detail.messages[0];
    assert_eq!(message.id, message_id);
    assert_eq!(message.response.as_deref(), Some("This is a test."));
    assert!(message.is_complete);
    assert_eq!(message.model_used.as_deref(), Some("local-model"));
    assert!(message.token_count.unwrap() > 0);
}

#[actix_web::test]
async fn chat_with_unreachable_inference_server_reports_notice() {
    let (app, env) = setup_test_environment().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&env.mock_server)
        .await;
    let id = create_conversation(&app).await;

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .insert_header(USER)
        .set_json(json!({"message": "Hello?", "conversation_id": id}))
        .to_request();
    let body = test::read_body(test::call_service(&app, req).await).await;
    let lines = data_lines(&body);

    let notice: Value = serde_json::from_str(&lines[2]).unwrap();
    assert!(notice["token"]
        .as_str()
        .unwrap()
        .contains("after 3 attempts"));
    assert_eq!(lines.last().unwrap(), "[DONE]");

    let detail = env.store.get_conversation("alice", &id).await.unwrap();
    assert!(!detail.messages[0].is_complete);
    assert!(detail.messages[0]
        .response
        .as_deref()
        .unwrap()
        .contains("Error:"));
}

#[actix_web::test]
async fn chat_validates_input() {
    let (app, _env) = setup_test_environment().await;
    let id = create_conversation(&app).await;

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .insert_header(USER)
        .set_json(json!({"message": "   ", "conversation_id": id}))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .insert_header(USER)
        .set_json(json!({"message": "hi", "conversation_id": "no-such-conversation"}))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .insert_header(USER)
        .set_json(json!({"message": "hi", "conversation_id": id, "file_ids": ["missing"]}))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[actix_web::test]
async fn files_upload_list_and_deactivate() {
    let (app, _env) = setup_test_environment().await;
    let id = create_conversation(&app).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{}/files?filename=list.txt", id))
        .insert_header(USER)
        .insert_header(("content-type", "text/plain"))
        .set_payload("milk\neggs")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let file: Value = test::read_body_json(resp).await;
    assert_eq!(file["filename"], "list.txt");
    assert_eq!(file["size"], 9);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{}/files?filename=cat.png", id))
        .insert_header(USER)
        .insert_header(("content-type", "image/png"))
        .set_payload(vec![0u8; 8])
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );

    let req = test::TestRequest::get()
        .uri(&format!("/api/conversations/{}/files", id))
        .insert_header(USER)
        .to_request();
    let files: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(files.as_array().unwrap().len(), 1);

    let req = test::TestRequest::post()
        .uri("/api/files/deactivate")
        .insert_header(USER)
        .to_request();
    let result: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(result["deactivated"], 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/conversations/{}/files", id))
        .insert_header(USER)
        .to_request();
    let files: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert!(files.as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn models_are_proxied_and_failures_become_bad_gateway() {
    let (app, env) = setup_test_environment().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "m1"}]})))
        .up_to_n_times(1)
        .mount(&env.mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&env.mock_server)
        .await;

    let req = test::TestRequest::get().uri("/api/models").to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let req = test::TestRequest::get()
        .uri("/api/models")
        .insert_header(USER)
        .to_request();
    let models: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(models["data"][0]["id"], "m1");

    let req = test::TestRequest::get()
        .uri("/api/models")
        .insert_header(USER)
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_GATEWAY
    );
}

#[actix_web::test]
async fn health_reports_inference_availability() {
    let (app, env) = setup_test_environment().await;
    mount_healthy_inference(&env.mock_server).await;

    let req = test::TestRequest::get().uri("/api/health").to_request();
    let health: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["inference_server"], true);
    assert_eq!(health["model"], "local-model");
}

#[actix_web::test]
async fn stop_without_active_generation_is_not_found() {
    let (app, env) = setup_test_environment().await;
    let id = create_conversation(&app).await;
    let message = env
        .store
        .insert_message("alice", &id, "hi", &[])
        .await
        .unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/chat/{}/stop", message.id))
        .insert_header(USER)
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );

    let req = test::TestRequest::post()
        .uri(&format!("/api/chat/{}/stop", message.id))
        .insert_header(("X-User-Id", "bob"))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn stop_cancels_running_generation_and_keeps_partial_text() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = SqliteChatStore::new(dir.path().join("chat.db"));
    store.init().await.expect("init store");
    let first_fragment_taken = Arc::new(Notify::new());
    let provider = StallingProvider {
        first_fragment_taken: first_fragment_taken.clone(),
    };
    let app = init_app(store.clone(), Arc::new(provider)).await;
    let id = create_conversation(&app).await;

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .insert_header(USER)
        .set_json(json!({"message": "Tell me a long story", "conversation_id": id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let message_id = message_id_of(&resp);

    tokio::time::timeout(Duration::from_secs(5), first_fragment_taken.notified())
        .await
        .expect("first fragment relayed");
    assert_eq!(stop_status(&app, message_id).await, StatusCode::OK);

    // The body ends once the relay has persisted and released the channel.
    let body = test::read_body(resp).await;
    let lines = data_lines(&body);
    assert_eq!(lines.last().unwrap(), r#"{"token":"Partial "}"#);
    assert!(!lines.iter().any(|line| line == "[DONE]"));

    let detail = store.get_conversation("alice", &id).await.unwrap();
    let message = &detail.messages[0];
    assert_eq!(message.id, message_id);
    assert_eq!(message.response.as_deref(), Some("Partial "));
    assert!(!message.is_complete);
    assert_eq!(message.model_used.as_deref(), Some("stalling-model"));

    assert_eq!(stop_status(&app, message_id).await, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn stop_during_slow_inference_response_stores_incomplete_message() {
    let (app, env) = setup_test_environment().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&env.mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(SSE_BODY)
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&env.mock_server)
        .await;
    let id = create_conversation(&app).await;

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .insert_header(USER)
        .set_json(json!({"message": "Hello?", "conversation_id": id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let message_id = message_id_of(&resp);

    assert_eq!(stop_status(&app, message_id).await, StatusCode::OK);

    let body = tokio::time::timeout(Duration::from_secs(5), test::read_body(resp))
        .await
        .expect("stream closes after stop");
    assert!(!data_lines(&body).iter().any(|line| line.contains("token")));

    let detail = env.store.get_conversation("alice", &id).await.unwrap();
    let message = &detail.messages[0];
    assert!(!message.is_complete);
    assert_eq!(message.response.as_deref().unwrap_or_default(), "");

    assert_eq!(stop_status(&app, message_id).await, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn chat_stores_message_text_as_sent() {
    let (app, env) = setup_test_environment().await;
    mount_healthy_inference(&env.mock_server).await;
    let id = create_conversation(&app).await;

    let req = test::TestRequest::post()
        .uri("/api/chat")
        .insert_header(USER)
        .set_json(json!({"message": "  two\nlines  ", "conversation_id": id}))
        .to_request();
    test::read_body(test::call_service(&app, req).await).await;

    let detail = env.store.get_conversation("alice", &id).await.unwrap();
    assert_eq!(detail.messages[0].content, "  two\nlines  ");
}
