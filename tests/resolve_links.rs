mod common;

use common::FakeIndex;
use driveindex_engine::auth::AuthContext;
use driveindex_engine::events::discard;
use driveindex_engine::models::LeafResult;
use driveindex_engine::resolver::LinkResolver;
use driveindex_engine::EngineError;

const EPISODE: &str = "https://idx.example.workers.dev/0:/Show/ep01.mkv";

fn leaf(url: &str, ordinal: u32) -> LeafResult {
    LeafResult {
        display_name: format!("ep{ordinal:02}"),
        raw_reference: url.to_string(),
        path: "Show".to_string(),
        size_bytes: None,
        ordinal,
        episode_number: ordinal as f32,
    }
}

#[test]
fn index_link_uses_advertised_download_domain() {
    let fake = FakeIndex::new().raw(
        &format!("{EPISODE}?a=view"),
        200,
        r#"<html><script>const cfg = {"downloaddomain":"cdn.example.com"};</script></html>"#,
    );
    let auth = AuthContext::default();
    let resolver = LinkResolver::new(&fake, &auth, &discard);
    let video = resolver.resolve(&leaf(EPISODE, 1)).expect("resolve");
    assert_eq!(video.playback_url, "https://cdn.example.com/0:/Show/ep01.mkv");
    assert_eq!(video.display_label, "Video");
}

#[test]
fn disabled_second_domain_returns_original_url() {
    let fake = FakeIndex::new().raw(
        &format!("{EPISODE}?a=view"),
        200,
        r#"<script>{"downloaddomain":"cdn.example.com","second_domain_for_dl":false}</script>"#,
    );
    let auth = AuthContext::default();
    let resolver = LinkResolver::new(&fake, &auth, &discard);
    let video = resolver.resolve(&leaf(EPISODE, 1)).expect("resolve");
    assert_eq!(video.playback_url, EPISODE);
}

#[test]
fn store_id_goes_through_the_file_view_page() {
    let original = "https://drive.google.com/uc?id=AbC123";
    let fake = FakeIndex::new().raw(
        "https://drive.google.com/file/d/AbC123/view",
        200,
        "<html><body>no player config</body></html>",
    );
    let auth = AuthContext::default();
    let resolver = LinkResolver::new(&fake, &auth, &discard);
    let video = resolver.resolve(&leaf(original, 1)).expect("resolve");
    assert_eq!(video.playback_url, original);
}

#[test]
fn failed_view_page_is_a_resolution_error_and_is_dropped_from_batches() {
    let second = "https://idx.example.workers.dev/0:/Show/ep02.mkv";
    let fake = FakeIndex::new()
        .raw(&format!("{EPISODE}?a=view"), 503, "busy")
        .raw(
            &format!("{second}?a=view"),
            200,
            r#"<script>{"videodomain":"https://v.example.com"}</script>"#,
        );
    let auth = AuthContext::default();
    let resolver = LinkResolver::new(&fake, &auth, &discard);

    let err = resolver.resolve(&leaf(EPISODE, 1)).unwrap_err();
    assert!(matches!(err, EngineError::Resolution { .. }), "err={err:?}");

    let resolved = resolver.resolve_all(&[leaf(EPISODE, 1), leaf(second, 2)]);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].0.ordinal, 2);
    assert_eq!(resolved[0].1.playback_url, "https://v.example.com/0:/Show/ep02.mkv");
}
