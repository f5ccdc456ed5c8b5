use std::sync::Arc;

use async_trait::async_trait;
use inku::{
    Context, ContentSource, EngineConfig, FetchError, MemorySource, Presenter, RenderOutcome, Session,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
struct RecordingPresenter {
    presented: Mutex<Vec<(String, String)>>,
}

impl Presenter for RecordingPresenter {
    fn present(&self, view: &str, html: &str) {
        self.presented.lock().push((view.to_string(), html.to_string()));
    }
}

/// Holds fetches of one path until released.
struct GatedSource {
    inner: MemorySource,
    gated: String,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl ContentSource for GatedSource {
    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        if path == self.gated {
            self.started.notify_one();
            self.release.notified().await;
        }
        self.inner.fetch(path).await
    }
}

fn site() -> MemorySource {
    MemorySource::new()
        .with(
            "pages/home/index.html",
            "<link rel=\"stylesheet\" href=\"/css/base.css\">{{$title = 'Home'}}<h1>{{?title}}</h1>{{include('parts/nav.html')}}",
        )
        .with(
            "pages/about/index.html",
            "<link rel=\"stylesheet\" href=\"/css/base.css\"><h1>About {{?site}}</h1>",
        )
        .with(
            "parts/nav.html",
            "<link rel='stylesheet' href='/css/nav.css'><nav/>",
        )
}

#[tokio::test]
async fn navigate_renders_routed_view_and_presents_once() {
    let session = Session::new(site(), RecordingPresenter::default(), EngineConfig::default());

    let outcome = session.navigate("").await.unwrap();
    assert!(matches!(outcome, RenderOutcome::Presented { ref view, generation: 1, .. } if view == "home"));

    let presented = session.presenter().presented.lock().clone();
    assert_eq!(presented, vec![("home".to_string(), "<h1>Home</h1><nav/>".to_string())]);
}

#[tokio::test]
async fn stylesheets_are_registered_once_per_session() {
    let session = Session::new(site(), RecordingPresenter::default(), EngineConfig::default())
        .with_base_context(Context::new().with("site", "Inku"));

    session.navigate("#/home").await.unwrap();
    session.navigate("#/about").await.unwrap();

    assert_eq!(session.styles().hrefs(), vec!["/css/nav.css", "/css/base.css"]);
    let presented = session.presenter().presented.lock().clone();
    assert_eq!(presented[1].1, "<h1>About Inku</h1>");
}

#[tokio::test]
async fn style_extraction_can_be_disabled() {
    let config = EngineConfig {
        extract_styles: false,
        ..EngineConfig::default()
    };
    let session = Session::new(site(), RecordingPresenter::default(), config);
    session.navigate("#/about").await.unwrap();

    assert!(session.styles().hrefs().is_empty());
    let presented = session.presenter().presented.lock().clone();
    assert!(presented[0].1.starts_with("<link rel=\"stylesheet\""));
}

#[tokio::test]
async fn superseded_render_is_discarded() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = GatedSource {
        inner: site(),
        gated: "pages/home/index.html".to_string(),
        started: started.clone(),
        release: release.clone(),
    };
    let session = Arc::new(Session::new(
        source,
        RecordingPresenter::default(),
        EngineConfig::default(),
    ));

    let slow = tokio::spawn({
        let session = session.clone();
        async move { session.navigate("#/home").await }
    });
    started.notified().await;

    let fast = session.navigate("#/about").await.unwrap();
    assert!(matches!(fast, RenderOutcome::Presented { generation: 2, .. }));

    release.notify_one();
    let slow = slow.await.unwrap().unwrap();
    assert_eq!(
        slow,
        RenderOutcome::Superseded {
            view: "home".to_string(),
            generation: 1
        }
    );

    let presented = session.presenter().presented.lock().clone();
    assert_eq!(presented.len(), 1);
    assert_eq!(presented[0].0, "about");
}

#[tokio::test]
async fn missing_view_is_an_error_and_presents_nothing() {
    let session = Session::new(site(), RecordingPresenter::default(), EngineConfig::default());
    assert!(session.navigate("#/nowhere").await.is_err());
    assert!(session.presenter().presented.lock().is_empty());
}
