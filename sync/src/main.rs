//! Cart Sync - interactive shell around one cart engine instance.
//!
//! Reads commands from stdin. The durable tier lives on disk, so carts
//! survive restarts; the order service is used when `CART_REMOTE_URL` is set.

use std::sync::Arc;

use cart_engine::{CartLine, LineMatcher};
use cart_sync::{
    CartEngine, Config, FileStorage, GuardSignal, HttpRemote, InMemoryRemote, MemoryStorage,
    RemoteCart, StaticAuth, StorageTiers,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
commands:
  add <product> <variant> [quantity] [size]
  add-json <line object>
  qty <line id> <quantity>
  rm <line id>
  clear | show | login <user> | logout | flush | help | quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cart_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let tiers = StorageTiers::new(
        Arc::new(MemoryStorage::named("session")),
        Arc::new(FileStorage::open(&config.storage_dir)?.named("durable")),
        Arc::new(MemoryStorage::named("cookies")),
    );
    let remote: Arc<dyn RemoteCart> = match &config.remote_url {
        Some(url) => {
            tracing::info!("Syncing with order service at {}", url);
            Arc::new(HttpRemote::new(url.clone()))
        }
        None => {
            tracing::info!("No CART_REMOTE_URL set, using an in-process order service");
            Arc::new(InMemoryRemote::new())
        }
    };
    let auth = Arc::new(StaticAuth::anonymous());

    let engine = CartEngine::builder(tiers)
        .config(config.engine())
        .remote(remote)
        .auth(auth.clone())
        .source("shell")
        .boot()
        .await;

    println!("{HELP}");
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = input.next_line().await? {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let args: Vec<&str> = words.collect();

        match (command, args.as_slice()) {
            ("add", [product, variant, rest @ ..]) => {
                let quantity = match rest.first().map(|q| q.parse::<u32>()) {
                    Some(Ok(quantity)) => quantity,
                    Some(Err(_)) => {
                        println!("quantity must be a whole number");
                        continue;
                    }
                    None => 1,
                };
                let mut cart_line = CartLine::new(*product, *variant, quantity);
                if let Some(size) = rest.get(1) {
                    cart_line = cart_line.with_size(*size);
                }
                println!("{:?}", engine.add(cart_line));
            }
            ("add-json", _) => {
                let raw = line.trim_start().trim_start_matches("add-json").trim();
                match serde_json::from_str(raw) {
                    Ok(value) => match engine.add_raw(&value) {
                        Ok(outcome) => println!("{outcome:?}"),
                        Err(e) => println!("{e}"),
                    },
                    Err(e) => println!("invalid JSON: {e}"),
                }
            }
            ("qty", [line_id, quantity]) => match quantity.parse::<u32>() {
                Ok(quantity) => {
                    println!(
                        "{:?}",
                        engine.update_quantity(&LineMatcher::line_id(*line_id), quantity)
                    );
                }
                Err(_) => println!("quantity must be a whole number"),
            },
            ("rm", [line_id]) => {
                let removed = engine.remove(&LineMatcher::line_id(*line_id));
                println!("removed {removed} line(s)");
            }
            ("clear", []) => engine.clear(),
            ("show", []) => println!("{}", serde_json::to_string_pretty(&engine.snapshot())?),
            ("login", [user_id]) => {
                auth.sign_in(*user_id);
                println!("{:?}", engine.on_signal(GuardSignal::AuthChanged).await);
            }
            ("logout", []) => {
                auth.sign_out();
                println!("{:?}", engine.on_signal(GuardSignal::AuthChanged).await);
            }
            ("flush", []) => engine.flush().await,
            ("help", _) => println!("{HELP}"),
            ("quit" | "exit", _) => break,
            _ => println!("unrecognized command, try `help`"),
        }
    }

    engine.shutdown().await;
    Ok(())
}
