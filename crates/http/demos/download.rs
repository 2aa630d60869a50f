//! Serves a ranged download of a file to stdout.
//!
//! ```text
//! cargo run --example download -- Cargo.toml "bytes=0-99,-50"
//! ```

use std::env;
use std::error::Error;

use bytes::BytesMut;
use micro_exchange::codec::HeadDecoder;
use micro_exchange::protocol::{DownloadOptions, Request, Response, TrustedProxies};
use tokio_util::codec::Decoder;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).with_writer(std::io::stderr).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "Cargo.toml".to_string());
    let range = args.next().unwrap_or_else(|| "bytes=0-99,-50".to_string());

    let raw = format!(
        "GET /files/{path} HTTP/1.1\r\nHost: internal:8080\r\nX-Forwarded-Host: downloads.example.com\r\n\
         X-Forwarded-Proto: https\r\nX-Forwarded-For: 203.0.113.9\r\nRange: {range}\r\n\r\n"
    );
    let mut buf = BytesMut::from(raw.as_str());
    let head = HeadDecoder.decode(&mut buf)?.ok_or("incomplete request head")?;

    let request = Request::builder()
        .head(head)
        .remote_addr("10.0.0.2".parse()?)
        .server_port(8080)
        .trusted_proxies(TrustedProxies::new(["10.0.0.0/8"])?)
        .build()?;
    info!(url = %request.url()?, client_ip = %request.client_ip(), "resolved request");

    let mut response = Response::for_request(&request);
    response.set_download(&path, DownloadOptions::default().attachment())?;
    info!(status_line = response.status_line(), "configured response");

    let mut stdout = tokio::io::stdout();
    let sent = response.send(&mut stdout).await?;
    info!(sent = sent.is_sent(), "done");
    Ok(())
}
