//! Charging Ahead Node - CLI client for the charging-station bus
//!
//! # Usage
//!
//! ```bash
//! # Fleet dashboard: print station state as it changes
//! ahead-node dashboard
//!
//! # Car console on a local broker, searches throttled to 4/s
//! ahead-node --host localhost console --search-interval-ms 250
//!
//! # Report a charger event as station hardware would
//! ahead-node charger --station 1 --charger 0 out-of-order
//! ```
//!
//! # Console input
//!
//! - `queue <station_id>`: join the queue at a station
//! - `leave <station_id> <car_id>`: leave a queue
//! - anything else: search stations by that text

use std::sync::Arc;
use std::time::Duration;

use ahead_adapter_mqtt::{
    ClientConfig, CommandPublisher, Intents, MqttConnection, StateSubscriber, Transport,
};
use ahead_core::{classify, AvailableChargers, RegistrySnapshot, TicketBook, TicketState};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Charging Ahead client node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "broker.hivemq.com")]
    host: String,

    /// MQTT broker port
    #[arg(short, long, default_value = "1883")]
    port: u16,

    /// MQTT client id (random if omitted)
    #[arg(long)]
    client_id: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Print every station snapshot with charger status
    Dashboard,

    /// Interactive car console reading commands from stdin
    Console {
        /// Minimum time between search dispatches (0 sends every keystroke)
        #[arg(long, default_value = "0")]
        search_interval_ms: u64,
    },

    /// Publish one charger event and exit
    Charger {
        /// Station id
        #[arg(long)]
        station: String,

        /// Charger id within the station
        #[arg(long)]
        charger: String,

        #[arg(value_enum)]
        event: ChargerEvent,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ChargerEvent {
    Connected,
    Disconnected,
    Available,
    OutOfOrder,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = ClientConfig::new(&args.host, args.port);
    if let Some(client_id) = &args.client_id {
        config = config.with_client_id(client_id);
    }
    if let Mode::Console {
        search_interval_ms, ..
    } = &args.mode
    {
        if *search_interval_ms > 0 {
            config = config.with_search_min_interval(Duration::from_millis(*search_interval_ms));
        }
    }

    // Print banner
    let broker = format!("{}:{}", config.broker.host, config.broker.port);
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Charging Ahead Node - Fleet Client              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Mode:      {:<49} ║", mode_name(&args.mode));
    println!("║  Broker:    {:<49} ║", truncate(&broker, 49));
    println!("║  Client ID: {:<49} ║", truncate(&config.client_id, 49));
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mqtt = Arc::new(MqttConnection::connect(&config));
    if let Err(e) = mqtt.wait_connected(config.broker.connect_timeout).await {
        if let Mode::Charger { .. } = args.mode {
            return Err(e.into());
        }
        warn!("{}; commands are dropped until the broker is reachable", e);
    }

    match args.mode {
        Mode::Dashboard => run_dashboard(mqtt, &config).await?,
        Mode::Console { .. } => run_console(mqtt, &config).await?,
        Mode::Charger {
            station,
            charger,
            event,
        } => run_charger(mqtt, &config, station, charger, event).await,
    }

    Ok(())
}

async fn run_dashboard(
    mqtt: Arc<MqttConnection>,
    config: &ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = StateSubscriber::start(mqtt, config)?;
    let mut snapshots = subscriber.snapshots();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Waiting for station snapshots...");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print!("{}", render_snapshot(&snapshot));
            }
        }
    }

    info!("Shutting down...");
    subscriber.shutdown().await;
    Ok(())
}

async fn run_console(
    mqtt: Arc<MqttConnection>,
    config: &ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let connection: Arc<dyn Transport> = mqtt;
    let subscriber = StateSubscriber::start(Arc::clone(&connection), config)?;
    let publisher = Arc::new(CommandPublisher::from_config(connection, config));
    let intents = Intents::from_config(publisher, config);

    let mut results = subscriber.search_results();
    let mut notices = subscriber.queue_notices();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut book = TicketBook::new();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    println!("Commands: queue <station>, leave <station> <car>, or any text to search");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&intents, &mut book, &line),
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            changed = results.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(result) = results.borrow_and_update().clone() {
                    print!("{}", render_search(&result));
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    if let Some(state) = book.apply(&notice) {
                        println!("{}", describe_ticket(notice.car_id(), state));
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed queue notices"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("Shutting down...");
    subscriber.shutdown().await;
    Ok(())
}

async fn run_charger(
    mqtt: Arc<MqttConnection>,
    config: &ClientConfig,
    station: String,
    charger: String,
    event: ChargerEvent,
) {
    let connection: Arc<dyn Transport> = mqtt.clone();
    let intents = Intents::from_config(
        Arc::new(CommandPublisher::from_config(connection, config)),
        config,
    );

    match event {
        ChargerEvent::Connected => intents.charger_connected(station, charger),
        ChargerEvent::Disconnected => intents.charger_disconnected(station, charger),
        ChargerEvent::Available => intents.charger_available(station, charger),
        ChargerEvent::OutOfOrder => intents.out_of_order(station, charger),
    }

    if intents.publisher().sent() == 1 {
        println!("Sent {:?}", event);
    } else {
        println!("Not connected; {:?} was not sent", event);
    }

    if let Err(e) = mqtt.disconnect() {
        warn!("Disconnect failed: {}", e);
    }
    if !mqtt.wait_closed(Duration::from_secs(2)).await {
        warn!("Broker connection did not close cleanly");
    }
}

// ============================================================================
// Console input
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum ConsoleInput {
    Queue(String),
    Leave(String, String),
    Search(String),
}

fn parse_input(line: &str) -> ConsoleInput {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["queue", station] => ConsoleInput::Queue(station.to_string()),
        ["leave", station, car] => ConsoleInput::Leave(station.to_string(), car.to_string()),
        _ => ConsoleInput::Search(line.trim().to_string()),
    }
}

fn handle_line(intents: &Intents, book: &mut TicketBook, line: &str) {
    let dropped = intents.publisher().dropped();

    match parse_input(line) {
        ConsoleInput::Queue(station) => {
            let car_id = intents.register_to_queue(station.clone());
            if intents.publisher().dropped() == dropped {
                println!("Requested a charger at station {} as {}", station, car_id);
                book.register(car_id, station);
            }
        }
        ConsoleInput::Leave(station, car_id) => {
            intents.unregister_from_queue(station.clone(), car_id.clone());
            if intents.publisher().dropped() == dropped {
                book.remove(&car_id);
                println!("Left the queue at station {}", station);
            }
        }
        ConsoleInput::Search(text) => intents.status_available_charger(text),
    }

    if intents.publisher().dropped() > dropped {
        println!("Not connected; request dropped");
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn render_snapshot(snapshot: &RegistrySnapshot) -> String {
    let mut lines = vec![format!("--- stations (v{}) ---", snapshot.version)];

    for station in &snapshot.stations {
        lines.push(format!(
            "[{}] {}  available: {}  unavailable: {}  queue: {}",
            station.id,
            station.name,
            station.available_chargers,
            station.unavailable_chargers,
            station.queue.len()
        ));
        for charger in &station.chargers {
            let classification = classify(charger);
            lines.push(format!("    charger {}: {}", charger.id, classification.label));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

fn render_search(result: &AvailableChargers) -> String {
    let mut lines = Vec::new();

    if let Some(message) = &result.message {
        lines.push(message.clone());
    }
    if result.stations.is_empty() && result.message.is_none() {
        lines.push("No stations found".to_string());
    }
    for station in &result.stations {
        lines.push(format!(
            "[{}] {}  available: {}  queue: {}",
            station.id,
            station.name,
            station.available_chargers,
            station.queue.len()
        ));
    }

    lines.push(String::new());
    lines.join("\n")
}

fn describe_ticket(car_id: &str, state: &TicketState) -> String {
    match state {
        TicketState::Pending => format!("{}: waiting for the controller", car_id),
        TicketState::Queued { position } => format!("{}: number {} in line", car_id, position),
        TicketState::Assigned { charger_id } => {
            format!("{}: go to charger {}", car_id, charger_id)
        }
    }
}

fn mode_name(mode: &Mode) -> &'static str {
    match mode {
        Mode::Dashboard => "dashboard",
        Mode::Console { .. } => "console",
        Mode::Charger { .. } => "charger",
    }
}

/// Truncate string with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahead_core::{Charger, StationDetail, StationRegistry, StationSummary};

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("queue 1"), ConsoleInput::Queue("1".to_string()));
        assert_eq!(
            parse_input("leave 1 AbCdE12345"),
            ConsoleInput::Leave("1".to_string(), "AbCdE12345".to_string())
        );
        assert_eq!(
            parse_input("  north lot "),
            ConsoleInput::Search("north lot".to_string())
        );
        // Wrong arity falls back to a search
        assert_eq!(parse_input("queue"), ConsoleInput::Search("queue".to_string()));
    }

    #[test]
    fn test_render_snapshot_uses_classifier() {
        let mut registry = StationRegistry::new();
        registry.apply_update(vec![StationDetail::new("1", "North Lot")
            .with_charger(Charger::new("0").with_car("AbCdE12345").charging(true))
            .with_charger(Charger::new("1").operational(false))]);

        let text = render_snapshot(&registry.snapshot());
        assert!(text.contains("[1] North Lot"));
        assert!(text.contains("charger 0: AbCdE12345 is charging"));
        assert!(text.contains("charger 1: needs service"));
    }

    #[test]
    fn test_render_search() {
        let result = AvailableChargers {
            stations: vec![StationSummary::new("1", "North Lot", 2)],
            message: None,
        };
        assert!(render_search(&result).contains("[1] North Lot  available: 2"));
        assert!(render_search(&AvailableChargers::default()).contains("No stations found"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-client-id", 10), "a-very-...");
    }
}
