//! `sharemesh client`: issue one request and print what comes back.

use crate::cli::ClientArgs;
use anyhow::{bail, Context};
use sharemesh_types::config::{DEFAULT_PORT, DEFAULT_SECURE_PORT};
use sharemesh_types::{PeerAddress, Resource};
use sharemesh_wire::{
    open_persistent, request, Command, PlainTransport, Reply, TlsTransport, Transport,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tracing::debug;

/// How long to wait for each reply frame.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the request described by the flags.
pub fn build_command(args: &ClientArgs) -> anyhow::Result<Command> {
    let resource = Resource {
        name: args.name.clone(),
        tags: args.tags.clone(),
        description: args.description.clone(),
        uri: args.uri.clone(),
        channel: args.channel.clone(),
        owner: args.owner.clone(),
        server_owner: None,
        size: None,
    };

    let command = if args.publish {
        Command::Publish { resource }
    } else if args.remove {
        Command::Remove { resource }
    } else if args.share {
        let Some(secret) = args.secret.clone() else {
            bail!("--share requires --secret");
        };
        Command::Share { resource, secret }
    } else if args.query {
        Command::Query {
            resource_template: resource,
            relay: args.relay,
        }
    } else if args.fetch {
        Command::Fetch {
            resource_template: resource,
        }
    } else if args.exchange {
        if args.servers.is_empty() {
            bail!("--exchange requires --servers");
        }
        Command::Exchange {
            server_list: args.servers.clone(),
        }
    } else if args.subscribe {
        Command::Subscribe {
            resource_template: resource,
            relay: args.relay,
            id: args
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    } else {
        bail!("no operation given");
    };
    Ok(command)
}

/// Local file name for a fetched URI: its last non-empty path segment.
pub fn fetch_file_name(uri: &str) -> Option<String> {
    let url = url::Url::parse(uri).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

fn transport(args: &ClientArgs) -> anyhow::Result<Box<dyn Transport>> {
    if !args.secure {
        return Ok(Box::new(PlainTransport));
    }
    let Some(tls) = args.tls.to_config() else {
        bail!("--secure requires --tls-cert, --tls-key and --tls-ca");
    };
    Ok(Box::new(
        TlsTransport::from_config(&tls).context("Failed to load TLS credentials")?,
    ))
}

/// Run the client subcommand.
pub async fn run(args: ClientArgs) -> anyhow::Result<()> {
    let command = build_command(&args)?;
    let transport = transport(&args)?;
    let default_port = if args.secure {
        DEFAULT_SECURE_PORT
    } else {
        DEFAULT_PORT
    };
    let server = PeerAddress::new(args.host.clone(), args.port.unwrap_or(default_port));
    debug!(server = %server, secure = args.secure, "Connecting");

    match &command {
        Command::Fetch { resource_template } => {
            fetch(transport.as_ref(), &server, &command, &resource_template.uri).await
        }
        Command::Subscribe { id, .. } => {
            subscribe(transport.as_ref(), &server, &command, id.clone()).await
        }
        _ => {
            let frames = request(transport.as_ref(), &server, &command, READ_TIMEOUT)
                .await
                .with_context(|| format!("Failed to reach {server}"))?;
            for frame in frames {
                println!("{frame}");
            }
            Ok(())
        }
    }
}

async fn fetch(
    transport: &dyn Transport,
    server: &PeerAddress,
    command: &Command,
    uri: &str,
) -> anyhow::Result<()> {
    let (mut reader, mut writer) = open_persistent(transport, server, command)
        .await
        .with_context(|| format!("Failed to reach {server}"))?;
    reader.set_timeout(Some(READ_TIMEOUT));

    let first = reader.read_frame().await?;
    println!("{first}");
    if !Reply::parse(&first)?.is_success() {
        return Ok(());
    }

    let metadata = reader.read_frame().await?;
    println!("{metadata}");
    let Reply::Resource(resource) = Reply::parse(&metadata)? else {
        bail!("Expected resource metadata, got {metadata}");
    };
    let Some(size) = resource.size else {
        bail!("Resource metadata has no resourceSize");
    };

    let name = fetch_file_name(uri).unwrap_or_else(|| "download".to_string());
    let path = PathBuf::from(&name);
    let mut file = tokio::fs::File::create(&path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    reader.set_timeout(None);
    let written = reader.read_raw(size, &mut file).await?;
    file.flush().await?;
    reader.set_timeout(Some(READ_TIMEOUT));
    debug!(bytes = written, path = %path.display(), "Saved fetched file");

    if let Ok(trailer) = reader.read_frame().await {
        println!("{trailer}");
    }
    let _ = writer.shutdown().await;
    Ok(())
}

async fn subscribe(
    transport: &dyn Transport,
    server: &PeerAddress,
    command: &Command,
    id: String,
) -> anyhow::Result<()> {
    let (mut reader, mut writer) = open_persistent(transport, server, command)
        .await
        .with_context(|| format!("Failed to reach {server}"))?;

    let printer = tokio::spawn(async move {
        while let Ok(frame) = reader.read_frame().await {
            println!("{frame}");
        }
    });

    eprintln!("Subscribed. Press Enter to unsubscribe.");
    let mut line = String::new();
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::select! {
        _ = stdin.read_line(&mut line) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    writer.write_json(&Command::Unsubscribe { id }).await?;
    let _ = tokio::time::timeout(READ_TIMEOUT, printer).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ClientArgs {
        ClientArgs {
            host: "localhost".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_publish() {
        let command = build_command(&ClientArgs {
            publish: true,
            uri: "http://x/1".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
            ..args()
        })
        .unwrap();
        match command {
            Command::Publish { resource } => {
                assert_eq!(resource.uri, "http://x/1");
                assert_eq!(resource.tags.len(), 2);
            }
            other => panic!("Expected Publish, got {other:?}"),
        }
    }

    #[test]
    fn test_share_requires_secret() {
        let result = build_command(&ClientArgs {
            share: true,
            ..args()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_exchange_requires_servers() {
        assert!(build_command(&ClientArgs {
            exchange: true,
            ..args()
        })
        .is_err());

        let command = build_command(&ClientArgs {
            exchange: true,
            servers: vec![PeerAddress::new("a", 1)],
            ..args()
        })
        .unwrap();
        assert_eq!(
            command,
            Command::Exchange {
                server_list: vec![PeerAddress::new("a", 1)]
            }
        );
    }

    #[test]
    fn test_subscribe_generates_id() {
        match build_command(&ClientArgs {
            subscribe: true,
            relay: true,
            ..args()
        })
        .unwrap()
        {
            Command::Subscribe { id, relay, .. } => {
                assert!(relay);
                assert!(!id.is_empty());
            }
            other => panic!("Expected Subscribe, got {other:?}"),
        }
    }

    #[test]
    fn test_fetch_file_name() {
        assert_eq!(
            fetch_file_name("file:///home/me/music/song.mp3").as_deref(),
            Some("song.mp3")
        );
        assert_eq!(
            fetch_file_name("file:///tmp/dir/").as_deref(),
            Some("dir")
        );
        assert_eq!(fetch_file_name("not a uri"), None);
    }
}
