use clap::{App, Arg};
use cruisesim::perturbation::RngSource;
use cruisesim::protocol::{apply, encode_line, parse_client_line, read_bounded_line, LineRead, Reply, ServerMessage};
use cruisesim::{Simulator, SimulatorConfig, TracingSink, WheelRpm};
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8090";
const TELEMETRY_BROADCAST_BUFFER_SIZE: usize = 256;

type SharedSimulator = Arc<Mutex<Simulator<RngSource<StdRng>, TracingSink, WheelRpm>>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("cruisesim-simulator")
        .version("0.1.0")
        .about("Vehicle dynamics simulator server for cruise controller testing")
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST")
                .takes_value(true)
                .default_value(DEFAULT_HOST),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON simulator configuration")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed the perturbation source for reproducible runs")
                .takes_value(true)
                .validator(|v| v.parse::<u64>().map(|_| ()).map_err(|_| "Seed must be a number".into())),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => SimulatorConfig::from_json_file(path)?,
        None => SimulatorConfig::default(),
    };
    let source = match matches.value_of("seed") {
        Some(seed) => RngSource::seeded(seed.parse()?),
        None => RngSource::from_entropy(),
    };
    let converter = WheelRpm::from_params(&config.wheel);

    info!(
        base_rate_hz = config.base_rate_hz,
        telemetry_rate_hz = config.telemetry_rate_hz,
        log_rate_hz = config.log_rate_hz,
        perturbation_rate_hz = config.perturbation_rate_hz,
        "starting cruise simulator"
    );

    let simulator: SharedSimulator =
        Arc::new(Mutex::new(Simulator::new(config, source, TracingSink, converter)?));
    let (telemetry_tx, _) = broadcast::channel(TELEMETRY_BROADCAST_BUFFER_SIZE);

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;

    tokio::select! {
        result = start_tcp_server(host, port, simulator, telemetry_tx) => {
            if let Err(e) = result {
                error!("TCP server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    info!("cruise simulator stopped");
    Ok(())
}

async fn start_tcp_server(
    host: &str,
    port: u16,
    simulator: SharedSimulator,
    telemetry_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind((host, port)).await?;
    info!("TCP server listening on {}:{}", host, port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("client connected: {}", addr);
                let client_simulator = Arc::clone(&simulator);
                let client_tx = telemetry_tx.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_simulator, client_tx).await {
                        warn!("client {} error: {}", addr, e);
                    }
                    info!("client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    simulator: SharedSimulator,
    telemetry_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));

    // Forward broadcast telemetry to this client
    let mut telemetry_rx = telemetry_tx.subscribe();
    let telemetry_writer = Arc::clone(&writer);
    let telemetry_task = tokio::spawn(async move {
        loop {
            match telemetry_rx.recv().await {
                Ok(line) => {
                    let mut writer_guard = telemetry_writer.lock().await;
                    if let Err(e) = writer_guard.write_all(line.as_bytes()).await {
                        warn!("failed to send telemetry: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client lagging, telemetry dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut buf = Vec::new();
    loop {
        let line = match read_bounded_line(&mut buf_reader, &mut buf).await {
            Ok(LineRead::Eof) => break,
            Ok(LineRead::Line(line)) => line,
            Ok(LineRead::TooLong) => {
                warn!("discarded oversized line");
                let response = encode_line(&ServerMessage::error("line exceeds maximum length"))?;
                writer.lock().await.write_all(response.as_bytes()).await?;
                continue;
            }
            Err(e) => {
                error!("error reading from client: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let reply = match parse_client_line(trimmed) {
            Ok(message) => {
                debug!(?message, "received");
                let mut simulator_guard = simulator.lock().await;
                apply(&mut *simulator_guard, message)
            }
            Err(e) => {
                warn!("failed to parse message: {}", e);
                Reply { response: ServerMessage::error(e.to_string()), telemetry: None }
            }
        };

        if let Some(telemetry) = reply.telemetry {
            // No subscribers is not an error
            let _ = telemetry_tx.send(encode_line(&telemetry)?);
        }

        let response = encode_line(&reply.response)?;
        let mut writer_guard = writer.lock().await;
        writer_guard.write_all(response.as_bytes()).await?;
    }

    telemetry_task.abort();
    Ok(())
}
