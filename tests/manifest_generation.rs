mod genai_stub;

use genai_stub::{GenaiStub, GenaiStubConfig, Reply};
use reelsmith::error::PipelineError;
use reelsmith::formats::{Transition, VisualEffect, VoiceGender};
use reelsmith::genai::GenaiClient;

fn stub_with_text(text: Reply) -> GenaiStub {
    GenaiStub::spawn(GenaiStubConfig {
        text,
        speech: Reply::Error {
            status: 500,
            message: "unused".to_owned(),
        },
        image: Reply::Error {
            status: 500,
            message: "unused".to_owned(),
        },
    })
}

#[tokio::test]
async fn manifest_is_generated_validated_and_written() -> anyhow::Result<()> {
    let fenced = format!("```json\n{}\n```", genai_stub::manifest_json("Lost City", 3));
    let stub = stub_with_text(Reply::Text(fenced));
    let settings = stub.settings();
    let client = GenaiClient::from_settings(&settings)?;

    let manifest = reelsmith::manifest::generate_manifest(
        &client,
        &settings,
        "  A long-forgotten city was found under the jungle.  ",
    )
    .await?;

    assert_eq!(manifest.title, "Lost City");
    assert_eq!(manifest.voice_gender, VoiceGender::Male);
    assert_eq!(manifest.scenes.len(), 3);
    assert_eq!(manifest.scenes[0].effect, VisualEffect::ZoomIn);
    assert_eq!(manifest.scenes[2].transition, Transition::Fade);
    // 3 + 4 + 5 seconds, filled in because the service sent 0.
    assert!((manifest.total_duration_estimate - 12.0).abs() < 1e-9);

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].path,
        format!("/v1beta/models/{}:generateContent", settings.text_model)
    );
    let input = requests[0]
        .body
        .pointer("/contents/0/parts/0/text")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    assert!(input.starts_with("BEGIN_ARTICLE\nA long-forgotten city"));
    assert_eq!(
        requests[0]
            .body
            .pointer("/generationConfig/responseMimeType")
            .and_then(|v| v.as_str()),
        Some("application/json")
    );

    let temp = tempfile::TempDir::new()?;
    let path = temp.path().join(reelsmith::manifest::MANIFEST_FILE_NAME);
    reelsmith::manifest::write(&manifest, &path).await?;
    let loaded = reelsmith::manifest::load(&path).await?;
    assert_eq!(loaded.as_ref(), Some(&manifest));
    Ok(())
}

#[tokio::test]
async fn service_error_becomes_generation_failure() -> anyhow::Result<()> {
    let stub = stub_with_text(Reply::Error {
        status: 429,
        message: "Resource has been exhausted".to_owned(),
    });
    let settings = stub.settings();
    let client = GenaiClient::from_settings(&settings)?;

    let err = reelsmith::manifest::generate_manifest(&client, &settings, "Some article.")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Generation(_)));
    assert!(err.to_string().contains("Resource has been exhausted"), "{err}");
    // Billed call: no retry.
    assert_eq!(stub.requests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_manifest_is_rejected() -> anyhow::Result<()> {
    let stub = stub_with_text(Reply::Text(
        serde_json::json!({ "title": "Empty", "scenes": [] }).to_string(),
    ));
    let settings = stub.settings();
    let client = GenaiClient::from_settings(&settings)?;

    let err = reelsmith::manifest::generate_manifest(&client, &settings, "Some article.")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no scenes"), "{err}");
    Ok(())
}

#[tokio::test]
async fn empty_article_is_rejected_without_a_request() -> anyhow::Result<()> {
    let stub = stub_with_text(Reply::Text("{}".to_owned()));
    let settings = stub.settings();
    let client = GenaiClient::from_settings(&settings)?;

    let err = reelsmith::manifest::generate_manifest(&client, &settings, " \n\t")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Generation(_)));
    assert!(stub.requests().is_empty());
    Ok(())
}
