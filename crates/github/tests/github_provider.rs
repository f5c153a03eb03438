use std::{sync::Arc, time::Duration};

use confluo_engine::{ActionError, ChainExecutor, ExecutorConfig, ProviderRegistry};
use confluo_github::{CREATE_COMMENT, CREATE_ISSUE, FIND_ISSUE, GithubConfig, NEW_ISSUE, PROVIDER_NAME, initialize};
use confluo_types::{ActionBinding, ActionKind, Params, ProviderSummary, RunStatus, Workflow, WorkflowAction, WorkflowGraph};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

fn bag(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
}

fn repo_params(extra: Value) -> Params {
    let mut params = bag(json!({"token": "secret", "owner": "octo", "repo": "hello"}));
    params.extend(bag(extra));
    params
}

async fn registry_for(server: &MockServer) -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    let config = GithubConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(2),
        ..Default::default()
    };
    initialize(&registry, config).expect("provider initializes");
    registry
}

fn issue(number: u64, title: &str) -> Value {
    json!({
        "number": number,
        "title": title,
        "state": "open",
        "html_url": format!("https://github.com/octo/hello/issues/{number}"),
    })
}

#[tokio::test]
async fn new_issue_fires_on_the_next_issue_number() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/12"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue(12, "Crash on start")))
        .expect(1)
        .mount(&server)
        .await;
    let registry = registry_for(&server).await;

    let output = registry
        .execute(PROVIDER_NAME, NEW_ISSUE, &repo_params(json!({"lastIssue": 11})))
        .await
        .expect("trigger fires");

    assert_eq!(output["lastIssue"], 12);
    assert_eq!(output["issueTitle"], "Crash on start");
    assert_eq!(output["issueUrl"], "https://github.com/octo/hello/issues/12");
    assert_eq!(output["token"], "secret");
}

#[tokio::test]
async fn new_issue_reports_not_triggered_on_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/12"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;
    let registry = registry_for(&server).await;

    let result = registry
        .execute(PROVIDER_NAME, NEW_ISSUE, &repo_params(json!({"lastIssue": 11})))
        .await;

    assert_eq!(result, Err(ActionError::NotTriggered));
}

#[tokio::test]
async fn new_issue_skips_pull_requests() {
    let server = MockServer::start().await;
    let mut pull_request = issue(12, "Add feature");
    pull_request["pull_request"] = json!({"url": "https://api.github.com/repos/octo/hello/pulls/12"});
    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pull_request))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/13"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue(13, "Real issue")))
        .mount(&server)
        .await;
    let registry = registry_for(&server).await;

    let output = registry
        .execute(PROVIDER_NAME, NEW_ISSUE, &repo_params(json!({"lastIssue": 11})))
        .await
        .expect("trigger fires");

    assert_eq!(output["lastIssue"], 13);
    assert_eq!(output["issueTitle"], "Real issue");
}

#[tokio::test]
async fn server_errors_are_transient_and_rejections_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/12"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/21"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
        .mount(&server)
        .await;
    let registry = registry_for(&server).await;

    let transient = registry
        .execute(PROVIDER_NAME, NEW_ISSUE, &repo_params(json!({"lastIssue": 11})))
        .await;
    assert!(transient.as_ref().is_err_and(ActionError::is_transient), "{transient:?}");

    let permanent = registry
        .execute(PROVIDER_NAME, NEW_ISSUE, &repo_params(json!({"lastIssue": 20})))
        .await;
    assert_eq!(permanent, Err(ActionError::permanent(Some(401), "Bad credentials")));
}

#[tokio::test]
async fn invalid_params_fail_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue(1, "unused")))
        .expect(0)
        .mount(&server)
        .await;
    let registry = registry_for(&server).await;

    let missing_token = registry
        .execute(PROVIDER_NAME, NEW_ISSUE, &bag(json!({"owner": "octo", "repo": "hello", "lastIssue": 1})))
        .await;
    assert!(matches!(missing_token, Err(ActionError::Configuration { ref key, .. }) if key == "token"));

    let bad_owner = registry
        .execute(PROVIDER_NAME, NEW_ISSUE, &bag(json!({"token": "t", "owner": "../admin", "repo": "hello", "lastIssue": 1})))
        .await;
    assert!(matches!(bad_owner, Err(ActionError::Configuration { ref key, .. }) if key == "owner"));

    let mistyped = registry
        .execute(PROVIDER_NAME, NEW_ISSUE, &repo_params(json!({"lastIssue": "11"})))
        .await;
    assert!(matches!(mistyped, Err(ActionError::Configuration { ref key, .. }) if key == "lastIssue"));
}

#[tokio::test]
async fn create_issue_posts_title_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/hello/issues"))
        .and(body_json(json!({"title": "Nightly build failed", "body": "See logs"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(issue(30, "Nightly build failed")))
        .expect(1)
        .mount(&server)
        .await;
    let registry = registry_for(&server).await;

    let output = registry
        .execute(
            PROVIDER_NAME,
            CREATE_ISSUE,
            &repo_params(json!({"title": "Nightly build failed", "body": "See logs"})),
        )
        .await
        .expect("issue created");

    assert_eq!(output["createdIssue"], 30);
    assert_eq!(output["createdIssueUrl"], "https://github.com/octo/hello/issues/30");
}

#[tokio::test]
async fn create_comment_falls_back_to_last_issue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/hello/issues/12/comments"))
        .and(body_json(json!({"body": "Thanks!"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 9001,
            "html_url": "https://github.com/octo/hello/issues/12#issuecomment-9001",
        })))
        .expect(1)
        .mount(&server)
        .await;
    let registry = registry_for(&server).await;

    let output = registry
        .execute(PROVIDER_NAME, CREATE_COMMENT, &repo_params(json!({"lastIssue": 12, "commentBody": "Thanks!"})))
        .await
        .expect("comment created");

    assert_eq!(output["commentId"], 9001);
    assert_eq!(output["lastIssue"], 12);
}

#[tokio::test]
async fn find_issue_treats_missing_issue_as_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "number": 5,
            "title": "Old bug",
            "state": "closed",
            "html_url": "https://github.com/octo/hello/issues/5",
        })))
        .mount(&server)
        .await;
    let registry = registry_for(&server).await;

    let found = registry
        .execute(PROVIDER_NAME, FIND_ISSUE, &repo_params(json!({"issueNumber": 5})))
        .await
        .expect("issue found");
    assert_eq!(found["issueState"], "closed");
    assert_eq!(found["issueTitle"], "Old bug");

    let missing = registry
        .execute(PROVIDER_NAME, FIND_ISSUE, &repo_params(json!({"issueNumber": 6})))
        .await;
    assert!(matches!(missing, Err(ActionError::PermanentExternal { status: Some(404), .. })));
}

fn bound(id: &str, kind: ActionKind, operation: &str, next: Option<&str>, params: Value) -> WorkflowAction {
    WorkflowAction {
        id: id.into(),
        kind,
        action: Some(ActionBinding {
            id: String::new(),
            operation: operation.into(),
            provider: ProviderSummary {
                name: PROVIDER_NAME.into(),
                ..Default::default()
            },
        }),
        next_action_id: next.map(str::to_string),
        params: bag(params),
        ..Default::default()
    }
}

#[tokio::test]
async fn new_issue_then_comment_runs_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue(12, "Crash on start")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/hello/issues/12/comments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 77, "html_url": "https://github.com/c/77"})))
        .expect(1)
        .mount(&server)
        .await;
    let registry = registry_for(&server).await;
    let graph = WorkflowGraph::build(Workflow {
        id: "triage".into(),
        name: "Comment on new issues".into(),
        trigger_id: Some("watch".into()),
        actions: vec![
            bound(
                "watch",
                ActionKind::Trigger,
                NEW_ISSUE,
                Some("reply"),
                json!({"owner": "octo", "repo": "hello", "lastIssue": 11}),
            ),
            bound("reply", ActionKind::Operation, CREATE_COMMENT, None, json!({"commentBody": "Thanks for the report"})),
        ],
        ..Default::default()
    })
    .expect("valid graph");
    let executor = ChainExecutor::new(
        Arc::new(registry),
        ExecutorConfig {
            poll_interval: Duration::from_millis(10),
        },
    );

    let report = executor.execute(&graph, bag(json!({"token": "secret"}))).await;

    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.failure);
    assert_eq!(report.visited, vec!["watch", "reply"]);
    assert_eq!(report.params["lastIssue"], 12);
    assert_eq!(report.params["commentId"], 77);
}
