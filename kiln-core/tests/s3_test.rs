use std::fs;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::put;
use axum::Router;
use flate2::read::GzDecoder;
use kiln_core::release::{CredentialChain, Credentials, EnvProvider, ObjectStore, S3Store};
use kiln_core::{
    ActionExecutor, Config, Error, Options, ProjectMetadata, PublishPipeline, Registry,
    RemoteOptions, TaskRunner,
};
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct CapturedPut {
    path: String,
    headers: HeaderMap,
    body: Vec<u8>,
}

#[derive(Clone, Default)]
struct Bucket {
    puts: Arc<Mutex<Vec<CapturedPut>>>,
    reject: bool,
}

impl Bucket {
    fn puts(&self) -> Vec<CapturedPut> {
        self.puts.lock().unwrap().clone()
    }
}

async fn capture(
    State(bucket): State<Bucket>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if bucket.reject {
        return StatusCode::FORBIDDEN;
    }
    bucket.puts.lock().unwrap().push(CapturedPut {
        path: uri.path().to_string(),
        headers,
        body: body.to_vec(),
    });
    StatusCode::OK
}

async fn serve(bucket: Bucket) -> SocketAddr {
    let app = Router::new()
        .route("/*path", put(capture))
        .with_state(bucket);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn remote(addr: SocketAddr) -> RemoteOptions {
    RemoteOptions {
        region: "us-west-1".to_string(),
        bucket: "bucket".to_string(),
        endpoint: format!("http://{}", addr),
        prefix: String::new(),
        acl: Some("public-read".to_string()),
        gzip: false,
    }
}

fn header<'a>(put: &'a CapturedPut, name: &str) -> &'a str {
    put.headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_put_object_is_signed() {
    let bucket = Bucket::default();
    let addr = serve(bucket.clone()).await;
    let store = S3Store::new(&remote(addr), Credentials::new("AKIDEXAMPLE", "secret")).unwrap();

    store
        .put_object("3.2.0/lib.js", b"var a=1;".to_vec(), "application/javascript")
        .await
        .unwrap();

    let puts = bucket.puts();
    assert_eq!(puts.len(), 1);
    let put = &puts[0];
    assert_eq!(put.path, "/bucket/3.2.0/lib.js");
    assert_eq!(put.body, b"var a=1;");
    assert_eq!(header(put, "content-type"), "application/javascript");
    assert_eq!(header(put, "x-amz-acl"), "public-read");
    assert!(header(put, "authorization").starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(header(put, "authorization").contains("/us-west-1/s3/aws4_request"));
    assert_eq!(header(put, "x-amz-date").len(), 16);
    assert_eq!(header(put, "x-amz-content-sha256").len(), 64);
}

#[tokio::test]
async fn test_session_token_is_forwarded() {
    let bucket = Bucket::default();
    let addr = serve(bucket.clone()).await;
    let mut credentials = Credentials::new("AKIDEXAMPLE", "secret");
    credentials.session_token = Some("token-123".to_string());
    let store = S3Store::new(&remote(addr), credentials).unwrap();

    store.put_object("a.css", b"a{}".to_vec(), "text/css").await.unwrap();

    assert_eq!(header(&bucket.puts()[0], "x-amz-security-token"), "token-123");
}

#[tokio::test]
async fn test_gzip_bodies_are_encoded() {
    let bucket = Bucket::default();
    let addr = serve(bucket.clone()).await;
    let mut options = remote(addr);
    options.gzip = true;
    let store = S3Store::new(&options, Credentials::new("AKIDEXAMPLE", "secret")).unwrap();

    let css = "a { color: red; }\n".repeat(64);
    store
        .put_object("3.2.0/css/site.css", css.clone().into_bytes(), "text/css")
        .await
        .unwrap();

    let put = &bucket.puts()[0];
    assert_eq!(header(put, "content-encoding"), "gzip");
    assert_eq!(header(put, "content-type"), "text/css");
    assert!(put.body.len() < css.len());
    assert!(header(put, "authorization").contains("content-encoding"));

    let mut decoded = String::new();
    GzDecoder::new(put.body.as_slice())
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, css);
}

#[tokio::test]
async fn test_rejected_put_is_an_error() {
    let bucket = Bucket {
        reject: true,
        ..Default::default()
    };
    let addr = serve(bucket.clone()).await;
    let store = S3Store::new(&remote(addr), Credentials::new("AKIDEXAMPLE", "secret")).unwrap();

    let err = store
        .put_object("3.2.0/lib.js", b"x".to_vec(), "application/javascript")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("403"), "{}", err);
}

#[test]
fn test_invalid_endpoint_rejected() {
    let mut options = remote("127.0.0.1:9".parse().unwrap());
    options.endpoint = "http://".to_string();
    assert!(S3Store::new(&options, Credentials::new("a", "b")).is_err());
}

/// Runs the server on its own runtime so the pipeline can block on uploads.
fn serve_in_background(bucket: Bucket) -> SocketAddr {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            tx.send(serve(bucket).await).unwrap();
            std::future::pending::<()>().await;
        });
    });
    rx.recv().unwrap()
}

#[test]
fn test_publish_over_http() {
    let bucket = Bucket::default();
    let addr = serve_in_background(bucket.clone());

    let temp = TempDir::new().unwrap();
    let content = format!(
        r#"
[options]
remote_endpoint = "http://{addr}"
remote_bucket = "bucket"
remote_prefix = "files/site"

[actions.build]
kind = "command"
command = "mkdir -p dist && printf 'a{{}}' > dist/style.css"

[tasks]
prepublish = ["build"]
"#
    );
    let config = Config::parse(&content, "kiln.toml").unwrap();
    let metadata = ProjectMetadata {
        name: "site".to_string(),
        version: Some("3.2.0".to_string()),
        homepage: None,
    };
    let options =
        Arc::new(Options::resolve(&config.options, &config.watch, temp.path(), metadata).unwrap());
    let registry = Arc::new(Registry::from_config(&config, &options).unwrap());
    let runner = Arc::new(TaskRunner::new(registry, ActionExecutor::new(temp.path())));
    let credentials = CredentialChain::new(vec![Box::new(EnvProvider::from_vars([
        ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
    ]))]);

    let outcome = PublishPipeline::new(options, runner)
        .with_credentials(credentials)
        .publish(None)
        .unwrap();

    assert_eq!(outcome.uploaded, 1);
    let puts = bucket.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].path, "/bucket/files/site/3.2.0/style.css");
    assert_eq!(puts[0].body, fs::read(temp.path().join("dist/style.css")).unwrap());
    assert_eq!(header(&puts[0], "content-type"), "text/css");
}

#[test]
fn test_publish_over_http_reports_upload_failure() {
    let bucket = Bucket {
        reject: true,
        ..Default::default()
    };
    let addr = serve_in_background(bucket);

    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("dist")).unwrap();
    fs::write(temp.path().join("dist/index.html"), "<html></html>").unwrap();
    let content = format!(
        "[options]\nremote_endpoint = \"http://{}\"\nremote_bucket = \"bucket\"\n",
        addr
    );
    let config = Config::parse(&content, "kiln.toml").unwrap();
    let metadata = ProjectMetadata {
        name: "site".to_string(),
        version: None,
        homepage: None,
    };
    let options =
        Arc::new(Options::resolve(&config.options, &config.watch, temp.path(), metadata).unwrap());
    let registry = Arc::new(Registry::from_config(&config, &options).unwrap());
    let runner = Arc::new(TaskRunner::new(registry, ActionExecutor::new(temp.path())));
    let credentials = CredentialChain::new(vec![Box::new(EnvProvider::from_vars([
        ("KILN_ACCESS_KEY_ID", "AKIDEXAMPLE"),
        ("KILN_SECRET_ACCESS_KEY", "secret"),
    ]))]);

    let err = PublishPipeline::new(options, runner)
        .with_credentials(credentials)
        .upload_only(Some("1.0.0"))
        .unwrap_err();
    assert!(
        matches!(err, Error::Publish { stage: kiln_core::PublishStage::Upload, .. }),
        "{}",
        err
    );
}
