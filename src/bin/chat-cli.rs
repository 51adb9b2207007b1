use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "chat-cli")]
#[command(about = "Send one call through a swindon-chat gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "ws://127.0.0.1:8080/swindon-chat")]
    url: String,

    /// Cookie header sent with the upgrade request
    #[arg(long)]
    cookie: Option<String>,

    /// Authorization header sent with the upgrade request
    #[arg(long)]
    authorization: Option<String>,

    /// Dotted method name, e.g. `chat.echo_message`
    method: String,

    /// Positional arguments as a JSON array
    #[arg(default_value = "[]")]
    args: String,

    /// Keyword arguments as a JSON object
    #[arg(default_value = "{}")]
    kwargs: String,

    #[arg(long, default_value = "1")]
    request_id: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let args: Value = serde_json::from_str(&cli.args)?;
    let kwargs: Value = serde_json::from_str(&cli.kwargs)?;

    let mut request = cli.url.as_str().into_client_request()?;
    if let Some(cookie) = &cli.cookie {
        request.headers_mut().insert("cookie", HeaderValue::from_str(cookie)?);
    }
    if let Some(authorization) = &cli.authorization {
        request
            .headers_mut()
            .insert("authorization", HeaderValue::from_str(authorization)?);
    }

    let (mut socket, _) = tokio_tungstenite::connect_async(request).await?;

    match socket.next().await {
        Some(Ok(Message::Text(text))) => print_frame("hello", text.as_str())?,
        other => return report_end(other),
    }

    let call = json!([cli.method, {"request_id": cli.request_id}, args, kwargs]);
    socket.send(Message::text(call.to_string())).await?;

    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                print_frame("result", text.as_str())?;
                break;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            other => return report_end(other),
        }
    }

    socket.close(None).await?;
    Ok(())
}

fn print_frame(label: &str, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let value: Value = serde_json::from_str(text)?;
    println!("{label}: {}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn report_end(
    frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    match frame {
        Some(Ok(Message::Close(Some(close)))) => {
            println!("closed: {} {}", u16::from(close.code), close.reason.as_str());
            Ok(())
        }
        Some(Ok(Message::Close(None))) | None => {
            println!("closed without a reason");
            Ok(())
        }
        Some(Ok(other)) => Err(format!("unexpected frame: {other:?}").into()),
        Some(Err(e)) => Err(e.into()),
    }
}
