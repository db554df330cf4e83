//! End-to-end behaviour of the response stream with faked collaborators

use futures::StreamExt;
use std::collections::HashSet;

use imagen_poe_bot::pipeline::orchestrator::{NO_IMAGES, PROMPT_REQUIRED};
use imagen_poe_bot::pipeline::PartialResponse;

use crate::common::{
    bot, chat, filtered_image, jpeg_image, Behaviour, FakeBackend, FakeSigner, FakeStore,
    RecordingSink,
};

fn texts(responses: &[PartialResponse]) -> Vec<&str> {
    responses.iter().filter_map(PartialResponse::as_text).collect()
}

fn attachment_count(responses: &[PartialResponse]) -> usize {
    responses
        .iter()
        .filter(|r| matches!(r, PartialResponse::Attachment(_)))
        .count()
}

#[tokio::test]
async fn test_all_links_stream_one_text_per_image_in_order() {
    let backend = FakeBackend::returning(vec![jpeg_image(), jpeg_image(), jpeg_image()]);
    let store = FakeStore::working();
    let sink = RecordingSink::working();
    let bot = bot(backend.clone(), store.clone(), FakeSigner::working(), sink.clone());

    let responses: Vec<_> = bot
        .respond(chat("sunset over dunes --number_of_images=3"))
        .collect()
        .await;

    assert_eq!(responses.len(), 3);
    let texts = texts(&responses);
    assert_eq!(texts.len(), 3);

    for (i, text) in texts.iter().enumerate() {
        assert!(
            text.trim_start().starts_with(&format!("![Generated Image_sunset_ove_image_{}.jpg](https://signed.example/", i + 1)),
            "unexpected response {}",
            text
        );
        // Later links must not run into the previous one
        assert_eq!(text.starts_with("\n\n"), i > 0);
    }

    let urls: HashSet<_> = texts.iter().collect();
    assert_eq!(urls.len(), 3);

    // Object keys are random, never derived from the prompt
    for (key, _, content_type) in store.uploads.lock().iter() {
        assert!(!key.contains("sunset"));
        assert_eq!(key.len(), 24 + ".jpg".len());
        assert_eq!(content_type, "image/jpeg");
    }

    assert!(sink.posted.lock().is_empty());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_failed_publishing_attaches_every_image_then_summarises() {
    let backend = FakeBackend::returning(vec![jpeg_image(), jpeg_image()]);
    let sink = RecordingSink::working();
    let bot = bot(backend, FakeStore::broken(), FakeSigner::working(), sink.clone());

    let responses: Vec<_> = bot
        .respond(chat("paper boats --number_of_images=2"))
        .collect()
        .await;

    assert_eq!(responses.len(), 3);
    assert_eq!(attachment_count(&responses[..2]), 2);
    assert_eq!(
        responses[2],
        PartialResponse::text("2 image(s) generated by Imagen3 attached for \"paper boats\".")
    );

    let posted = sink.posted.lock();
    assert_eq!(posted.len(), 2);
    assert!(posted.iter().all(|(message_id, _)| message_id == "msg-1"));
    let names: Vec<_> = posted.iter().map(|(_, a)| a.filename.as_str()).collect();
    assert_eq!(names, vec!["paper_boat_image_1.jpg", "paper_boat_image_2.jpg"]);
}

#[tokio::test]
async fn test_signing_failure_also_falls_back() {
    let store = FakeStore::working();
    let sink = RecordingSink::working();
    let bot = bot(
        FakeBackend::returning(vec![jpeg_image()]),
        store.clone(),
        FakeSigner::broken(),
        sink.clone(),
    );

    let responses: Vec<_> = bot.respond(chat("a kite")).collect().await;

    assert_eq!(attachment_count(&responses), 1);
    assert_eq!(
        texts(&responses),
        vec!["1 image(s) generated by Imagen3 attached for \"a kite\"."]
    );
    // The uploaded object is orphaned but never referenced
    assert_eq!(store.uploads.lock().len(), 1);
    assert_eq!(sink.posted.lock().len(), 1);
}

#[tokio::test]
async fn test_empty_prompt_never_reaches_the_model() {
    let backend = FakeBackend::returning(vec![jpeg_image()]);
    let bot = bot(
        backend.clone(),
        FakeStore::working(),
        FakeSigner::working(),
        RecordingSink::working(),
    );

    let responses: Vec<_> = bot.respond(chat("")).collect().await;

    assert_eq!(responses, vec![PartialResponse::text(PROMPT_REQUIRED)]);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_zero_images_advises_rewording() {
    let sink = RecordingSink::working();
    let bot = bot(
        FakeBackend::returning(vec![]),
        FakeStore::working(),
        FakeSigner::working(),
        sink.clone(),
    );

    let responses: Vec<_> = bot.respond(chat("something")).collect().await;

    assert_eq!(responses, vec![PartialResponse::text(NO_IMAGES)]);
    assert!(sink.posted.lock().is_empty());
}

#[tokio::test]
async fn test_generation_failure_is_reported_verbatim() {
    let bot = bot(
        FakeBackend::new(Behaviour::Fail("Vertex AI returned 429: quota exceeded".to_string())),
        FakeStore::working(),
        FakeSigner::working(),
        RecordingSink::working(),
    );

    let responses: Vec<_> = bot.respond(chat("bees")).collect().await;

    assert_eq!(
        responses,
        vec![PartialResponse::text("Error: Vertex AI returned 429: quota exceeded")]
    );
}

#[tokio::test]
async fn test_directive_reaches_the_backend_clamped() {
    let backend = FakeBackend::returning(vec![jpeg_image()]);
    let bot = bot(
        backend.clone(),
        FakeStore::working(),
        FakeSigner::working(),
        RecordingSink::working(),
    );

    let _: Vec<_> = bot
        .respond(chat("owls --number_of_images=9"))
        .collect()
        .await;

    let requests = backend.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].prompt, "owls");
    assert_eq!(requests[0].n, 4);
    assert_eq!(requests[0].language, "en");
    assert_eq!(requests[0].aspect_ratio, "1:1");
}

#[tokio::test]
async fn test_empty_images_are_skipped_and_keep_their_index() {
    let bot = bot(
        FakeBackend::returning(vec![jpeg_image(), filtered_image(), jpeg_image()]),
        FakeStore::working(),
        FakeSigner::working(),
        RecordingSink::working(),
    );

    let responses: Vec<_> = bot.respond(chat("foxes --number_of_images=3")).collect().await;
    let texts = texts(&responses);

    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("foxes_image_1.jpg"));
    assert!(texts[1].contains("foxes_image_3.jpg"));
}

#[tokio::test]
async fn test_batch_of_only_empty_images() {
    let bot = bot(
        FakeBackend::returning(vec![filtered_image(), filtered_image()]),
        FakeStore::working(),
        FakeSigner::working(),
        RecordingSink::working(),
    );

    let responses: Vec<_> = bot.respond(chat("forbidden --number_of_images=2")).collect().await;

    assert_eq!(responses, vec![PartialResponse::text(NO_IMAGES)]);
}

#[tokio::test]
async fn test_partial_attachment_failure_counts_delivered_only() {
    let sink = RecordingSink::failing_first(1);
    let bot = bot(
        FakeBackend::returning(vec![jpeg_image(), jpeg_image()]),
        FakeStore::broken(),
        FakeSigner::working(),
        sink.clone(),
    );

    let responses: Vec<_> = bot.respond(chat("comets --number_of_images=2")).collect().await;

    assert_eq!(attachment_count(&responses), 1);
    assert_eq!(
        texts(&responses),
        vec!["1 image(s) generated by Imagen3 attached for \"comets\"."]
    );
}

#[tokio::test]
async fn test_no_attachment_delivered_ends_with_error() {
    let bot = bot(
        FakeBackend::returning(vec![jpeg_image(), jpeg_image()]),
        FakeStore::broken(),
        FakeSigner::working(),
        RecordingSink::failing_first(2),
    );

    let responses: Vec<_> = bot.respond(chat("comets --number_of_images=2")).collect().await;

    assert_eq!(responses.len(), 1);
    let text = responses[0].as_text().unwrap();
    assert!(text.starts_with("Error: "));
    assert!(text.contains("none of the 2 images"));
}

#[tokio::test]
async fn test_panicking_backend_becomes_error_text() {
    let bot = bot(
        FakeBackend::new(Behaviour::Panic),
        FakeStore::working(),
        FakeSigner::working(),
        RecordingSink::working(),
    );

    let responses: Vec<_> = bot.respond(chat("anything")).collect().await;

    assert_eq!(
        responses,
        vec![PartialResponse::text("Error: Internal error: model handle poisoned")]
    );
}

#[tokio::test]
async fn test_links_end_without_summary() {
    let bot = bot(
        FakeBackend::returning(vec![jpeg_image(), jpeg_image()]),
        FakeStore::working(),
        FakeSigner::working(),
        RecordingSink::working(),
    );

    let responses: Vec<_> = bot.respond(chat("two links --number_of_images=2")).collect().await;

    assert_eq!(responses.len(), 2);
    assert_eq!(attachment_count(&responses), 0);
    assert!(texts(&responses)
        .iter()
        .all(|text| !text.contains("attached for")));
}

#[tokio::test]
async fn test_mixed_batch_streams_links_then_attachments_then_summary() {
    let store = FakeStore::failing_on(&[2]);
    let sink = RecordingSink::working();
    let bot = bot(
        FakeBackend::returning(vec![jpeg_image(), jpeg_image(), jpeg_image()]),
        store.clone(),
        FakeSigner::working(),
        sink.clone(),
    );

    let responses: Vec<_> = bot
        .respond(chat("mixed bag --number_of_images=3"))
        .collect()
        .await;

    assert_eq!(responses.len(), 4);

    let first = responses[0].as_text().unwrap();
    assert!(first.starts_with("![Generated Image_mixed_bag_image_1.jpg](https://signed.example/"));

    let second = responses[1].as_text().unwrap();
    assert!(second.starts_with("\n\n![Generated Image_mixed_bag_image_3.jpg](https://signed.example/"));

    match &responses[2] {
        PartialResponse::Attachment(attachment) => {
            assert_eq!(attachment.filename, "mixed_bag_image_2.jpg");
        }
        other => panic!("expected attachment, got {:?}", other),
    }

    assert_eq!(
        responses[3],
        PartialResponse::text("\n\n1 image(s) generated by Imagen3 attached for \"mixed bag\".")
    );

    assert_eq!(store.uploads.lock().len(), 2);
    let posted = sink.posted.lock();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].1.filename, "mixed_bag_image_2.jpg");
}
