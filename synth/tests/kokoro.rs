use httpmock::{Method::POST, MockServer};
use serde_json::json;
use synth::{KokoroPipeline, PipelineConfig, SpeechRequest, SynthError, Synthesizer};

fn config(base_url: String) -> PipelineConfig {
    PipelineConfig {
        base_url,
        voice: "af_heart".into(),
        lang_code: "a".into(),
        device: "cpu".into(),
        speed: 1.0,
    }
}

async fn loaded_pipeline(server: &MockServer) -> KokoroPipeline {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/load");
            then.status(200).json_body(json!({ "sample_rate": 24000 }));
        })
        .await;
    KokoroPipeline::connect(config(server.base_url())).await.unwrap()
}

#[tokio::test]
async fn connect_sends_pipeline_config() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/load").json_body(json!({
                "voice": "af_heart",
                "lang_code": "a",
                "device": "cpu",
                "speed": 1.0
            }));
            then.status(200).json_body(json!({ "sample_rate": 24000 }));
        })
        .await;

    let pipeline = KokoroPipeline::connect(config(server.base_url())).await.unwrap();
    assert_eq!(pipeline.sample_rate(), 24000);
    assert_eq!(pipeline.engine_name(), "kokoro");
    mock.assert_async().await;
}

#[tokio::test]
async fn connect_surfaces_load_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/load");
            then.status(500).body("out of memory");
        })
        .await;

    let err = KokoroPipeline::connect(config(server.base_url())).await.unwrap_err();
    match err {
        SynthError::Engine(msg) => assert!(msg.contains("out of memory")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn connect_fails_when_runtime_is_down() {
    // Nothing listens on this port.
    let err = KokoroPipeline::connect(config("http://127.0.0.1:9".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, SynthError::Network(_)));
}

#[tokio::test]
async fn synthesize_drains_fragments_in_order() {
    let server = MockServer::start_async().await;
    let pipeline = loaded_pipeline(&server).await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/synthesize").json_body(json!({
                "text": "Hello world",
                "voice": "af_heart",
                "speed": 1.0
            }));
            then.status(200).body(concat!(
                "{\"text\":\"Hello\",\"phonemes\":\"h\u{0259}\u{02c8}lo\u{028a}\",\"samples\":[0.1,0.2]}\n",
                "{\"text\":\"world\",\"phonemes\":\"w\u{02c8}\u{025d}ld\",\"samples\":[0.3],\"sample_rate\":24000}\n",
            ));
        })
        .await;

    let stream = pipeline
        .synthesize(&SpeechRequest::new("Hello world"))
        .await
        .unwrap();
    let clip = synth::drain(stream).await.unwrap();
    // The first fragment omits the rate and falls back to the loaded one.
    assert_eq!(clip.sample_rate, 24000);
    assert_eq!(clip.samples, vec![0.1, 0.2, 0.3]);
    mock.assert_async().await;
}

#[tokio::test]
async fn synthesize_forwards_voice_and_speed_overrides() {
    let server = MockServer::start_async().await;
    let pipeline = loaded_pipeline(&server).await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/synthesize").json_body(json!({
                "text": "hi",
                "voice": "bf_emma",
                "speed": 0.9
            }));
            then.status(200)
                .body("{\"samples\":[0.5],\"sample_rate\":24000}\n");
        })
        .await;

    let req = SpeechRequest {
        text: "hi".into(),
        voice: Some("bf_emma".into()),
        speed: Some(0.9),
    };
    let stream = pipeline.synthesize(&req).await.unwrap();
    synth::drain(stream).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn synthesize_surfaces_engine_error_fragment() {
    let server = MockServer::start_async().await;
    let pipeline = loaded_pipeline(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/synthesize");
            then.status(200)
                .body("{\"samples\":[0.1]}\n{\"error\":\"unknown voice\"}\n");
        })
        .await;

    let stream = pipeline
        .synthesize(&SpeechRequest::new("hi"))
        .await
        .unwrap();
    let err = synth::drain(stream).await.unwrap_err();
    match err {
        SynthError::Engine(msg) => assert_eq!(msg, "unknown voice"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn synthesize_rejects_undecodable_fragment() {
    let server = MockServer::start_async().await;
    let pipeline = loaded_pipeline(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/synthesize");
            then.status(200).body("not json\n");
        })
        .await;

    let stream = pipeline
        .synthesize(&SpeechRequest::new("hi"))
        .await
        .unwrap();
    let err = synth::drain(stream).await.unwrap_err();
    assert!(matches!(err, SynthError::InvalidResponse(_)));
}

#[tokio::test]
async fn synthesize_handles_missing_trailing_newline() {
    let server = MockServer::start_async().await;
    let pipeline = loaded_pipeline(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/synthesize");
            then.status(200)
                .body("{\"samples\":[0.1,0.2],\"sample_rate\":24000}");
        })
        .await;

    let stream = pipeline
        .synthesize(&SpeechRequest::new("hi"))
        .await
        .unwrap();
    let clip = synth::drain(stream).await.unwrap();
    assert_eq!(clip.samples.len(), 2);
}
