use evoc::config::{ClientConfig, Endpoints};
use evoc::engine::{ArtifactSource, ArtifactStore, RunBackend, RunClient, ShareService};
use evoc::error::{ArtifactFetchError, QueryError, ShareError, SubmissionError};
use evoc::model::{Algorithm, ArtifactKind, ConfigModel, RunId, RunStatus, Submission};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig {
        endpoints: Endpoints::new(&server.uri(), &server.uri()),
        ..ClientConfig::default()
    }
}

fn scenario_submission() -> Submission {
    Submission::new(ConfigModel {
        algorithm: Some(Algorithm::Simple),
        population_size: Some(50),
        generations: Some(20),
        weights: vec![1.0],
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn submit_sends_the_config_and_returns_a_running_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/runs/create"))
        .and(header_exists("Idempotency-Key"))
        .and(body_json(json!({
            "algorithm": "eaSimple",
            "populationSize": 50,
            "generations": 20,
            "weights": [1.0]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "runID": "65f1c0ffee", "status": "running" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = RunClient::new(&config_for(&server)).unwrap();
    let record = client.submit(&scenario_submission()).await.unwrap();

    assert_eq!(record.id.as_str(), "65f1c0ffee");
    assert_eq!(record.status, RunStatus::Running);
}

#[tokio::test]
async fn submit_surfaces_backend_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/runs/create"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "weights required" })),
        )
        .mount(&server)
        .await;

    let client = RunClient::new(&config_for(&server)).unwrap();
    let err = client.submit(&scenario_submission()).await.unwrap_err();

    match err {
        SubmissionError::Rejected { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "weights required");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn invalid_config_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut submission = scenario_submission();
    submission.config.population_size = None;
    let client = RunClient::new(&config_for(&server)).unwrap();

    let err = client.submit(&submission).await.unwrap_err();
    assert!(matches!(err, SubmissionError::InvalidConfig(_)));
}

#[tokio::test]
async fn status_query_decodes_each_state_and_keeps_the_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/runs/run"))
        .and(body_json(json!({ "runID": "r-done" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "status": "completed", "runID": "something-else" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/runs/run"))
        .and(body_json(json!({ "runID": "r-bad" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "status": "error", "message": "Traceback (most recent call last)" }
        })))
        .mount(&server)
        .await;

    let client = RunClient::new(&config_for(&server)).unwrap();

    let done = client.query_status(&RunId::new("r-done")).await.unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(done.id.as_str(), "r-done");

    let bad = client.query_status(&RunId::new("r-bad")).await.unwrap();
    assert_eq!(bad.status, RunStatus::Errored);
    assert_eq!(bad.message(), Some("Traceback (most recent call last)"));
}

#[tokio::test]
async fn status_query_failure_is_a_query_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/runs/run"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = RunClient::new(&config_for(&server)).unwrap();
    let err = client.query_status(&RunId::new("r1")).await.unwrap_err();
    assert!(matches!(err, QueryError::Status { status: 500 }));
}

#[tokio::test]
async fn share_maps_response_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/runs/share"))
        .and(body_json(json!({ "runID": "r-ok", "userEmailList": ["a@x.com", "b@y.com"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/runs/share"))
        .and(body_json(json!({ "runID": "r-401", "userEmailList": ["a@x.com"] })))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/runs/share"))
        .and(body_json(json!({ "runID": "r-400", "userEmailList": ["ghost@x.com"] })))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "Unknown user ghost@x.com" })),
        )
        .mount(&server)
        .await;

    let client = Arc::new(RunClient::new(&config_for(&server)).unwrap());
    let service = ShareService::new(client);

    let receipt = service
        .share(&RunId::new("r-ok"), "a@x.com, b@y.com")
        .await
        .unwrap();
    assert_eq!(receipt.recipients.len(), 2);

    assert_eq!(
        service.share(&RunId::new("r-401"), "a@x.com").await,
        Err(ShareError::Unauthorized)
    );
    assert_eq!(
        service.share(&RunId::new("r-400"), "ghost@x.com").await,
        Err(ShareError::Rejected {
            message: "Unknown user ghost@x.com".into()
        })
    );
}

#[tokio::test]
async fn store_decodes_by_kind_and_only_checks_the_plot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/code/r1/input.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "algorithm": "eaSimple" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/code/r1/best.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[1, 0, 1]"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/code/r1/fitness_plot.png"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/code/r1/fitness_plot.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let store = ArtifactStore::new(&config_for(&server)).unwrap();
    let id = RunId::new("r1");

    let input = store.fetch(&id, ArtifactKind::InputConfig).await.unwrap();
    assert_eq!(input.as_structured().unwrap()["algorithm"], "eaSimple");

    let best = store.fetch(&id, ArtifactKind::Best).await.unwrap();
    assert_eq!(best.as_text(), Some("[1, 0, 1]"));

    let plot = store.fetch(&id, ArtifactKind::FitnessPlot).await.unwrap();
    assert_eq!(
        plot.as_reference(),
        Some(format!("{}/code/r1/fitness_plot.png", server.uri()).as_str())
    );
}

#[tokio::test]
async fn missing_object_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/code/r1/fitness_plot.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = ArtifactStore::new(&config_for(&server)).unwrap();
    let err = store
        .fetch(&RunId::new("r1"), ArtifactKind::FitnessPlot)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ArtifactFetchError::Status {
            kind: ArtifactKind::FitnessPlot,
            status: 404
        }
    );
}

#[tokio::test]
async fn run_id_is_encoded_into_a_single_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/code/a%2Fb%3Fc/best.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[0, 1]"))
        .expect(1)
        .mount(&server)
        .await;

    let store = ArtifactStore::new(&config_for(&server)).unwrap();
    let best = store
        .fetch(&RunId::new("a/b?c"), ArtifactKind::Best)
        .await
        .unwrap();
    assert_eq!(best.as_text(), Some("[0, 1]"));

    let err = store
        .fetch(&RunId::new(".."), ArtifactKind::Best)
        .await
        .unwrap_err();
    assert!(matches!(err, ArtifactFetchError::Location { .. }));
}
