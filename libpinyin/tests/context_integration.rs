//! PinyinContext: configuration, preedit, strict mode and cloud requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use cloudpinyin::{CloudInput, Fetcher, PinyinConfig, PinyinContext, RequestState};

const WAIT: Duration = Duration::from_secs(10);

fn double_pinyin_config(strict: bool) -> PinyinConfig {
    PinyinConfig {
        use_double_pinyin: true,
        strict_double_pinyin: strict,
        ..PinyinConfig::default()
    }
}

#[test]
fn preedit_is_raw_without_double_pinyin() {
    let ctx = PinyinContext::new(PinyinConfig::default()).unwrap();
    assert_eq!(ctx.preedit("uihf"), "uihf");
    assert!(ctx.accepts("uihfu"));
}

#[test]
fn preedit_decodes_double_pinyin() {
    let ctx = PinyinContext::new(double_pinyin_config(false)).unwrap();
    assert_eq!(ctx.preedit("uihf"), "shi hen");
    assert_eq!(ctx.preedit("uihfu"), "shi hen sh");
    // lenient mode accepts incomplete input
    assert!(ctx.accepts("uihfu"));
}

#[test]
fn strict_mode_rejects_incomplete_input() {
    let ctx = PinyinContext::new(double_pinyin_config(true)).unwrap();
    assert!(ctx.accepts("uihf"));
    assert!(!ctx.accepts("uihfu"));
    assert!(!ctx.accepts("qa"));
}

#[test]
fn scheme_from_toml() {
    let config = PinyinConfig::from_toml_str(
        r#"
        use_double_pinyin = true
        double_pinyin_scheme = "XiaoHe"
        worker_threads = 1
        "#,
    )
    .unwrap();
    let ctx = PinyinContext::new(config).unwrap();
    assert_eq!(ctx.preedit("xl"), "xiang");
}

#[test]
fn config_file_round_trip() {
    let path = std::env::temp_dir().join(format!(
        "cloudpinyin_config_{}.toml",
        std::process::id()
    ));
    let mut config = double_pinyin_config(true);
    config.cloud.timeout_ms = 250;
    config.save_toml(&path).unwrap();
    let loaded = PinyinConfig::load_toml(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(loaded, config);
}

#[test]
fn correction_runs_through_fetcher() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher: Arc<dyn Fetcher> = {
        let calls = Arc::clone(&calls);
        Arc::new(move |p: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            format!("[[\"{}\"]]", p.to_uppercase())
        })
    };
    let ctx = PinyinContext::with_fetcher(double_pinyin_config(false), fetcher).unwrap();

    let (tx, rx) = mpsc::channel();
    let id = ctx
        .request_correction("nihao", move |req| {
            tx.send((req.id(), req.response_payload().map(str::to_string)))
                .unwrap();
        })
        .unwrap();

    let (seen, body) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(seen, id);
    assert_eq!(body.as_deref(), Some("[[\"NIHAO\"]]"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.queue().request_count(), 1);

    let done = ctx.queue().remove_first_request().unwrap();
    assert_eq!(done.state(), RequestState::Retired);
    assert_eq!(ctx.queue().request_count(), 0);
}

#[test]
fn disabled_cloud_responds_empty() {
    let ctx = PinyinContext::with_cloud(double_pinyin_config(false), CloudInput::default()).unwrap();
    let (tx, rx) = mpsc::channel();
    ctx.request_correction("nihao", move |req| {
        tx.send((req.responded(), req.response_payload().map(str::to_string)))
            .unwrap();
    })
    .unwrap();
    let (responded, body) = rx.recv_timeout(WAIT).unwrap();
    assert!(responded);
    assert_eq!(body.as_deref(), Some(""));
}

#[test]
fn independent_contexts_do_not_share_state() {
    let mut a = PinyinContext::new(double_pinyin_config(false)).unwrap();
    let b = PinyinContext::new(double_pinyin_config(false)).unwrap();
    a.mapper_mut().clear();
    assert_eq!(a.preedit("ui"), "ui");
    assert_eq!(b.preedit("ui"), "shi");
}
