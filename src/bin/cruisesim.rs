use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use cruisesim::protocol::{encode_line, ClientMessage, ServerMessage};
use cruisesim::{frames, BusFrame, RngSource, Simulator, SimulatorConfig, WheelRpm, WriterSink};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8090";
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn number_validator<T: std::str::FromStr>(message: &'static str) -> impl Fn(String) -> Result<(), String> {
    move |v| v.parse::<T>().map(|_| ()).map_err(|_| message.to_string())
}

#[tokio::main]
async fn main() -> CliResult {
    // Diagnostics to stderr, offline log lines stay on stdout
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let matches = App::new("cruisesim")
        .version("0.1.0")
        .author("Vehicle Systems Engineering Team")
        .about("🚗 Cruise simulator client - drive and inspect the vehicle dynamics simulator")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("setpoint")
                .about("🎯 Send a single drive setpoint frame")
                .arg(
                    Arg::with_name("value")
                        .help("Controller output, e.g. 0.5 for 50%")
                        .required(true)
                        .allow_hyphen_values(true)
                        .validator(number_validator::<f32>("Setpoint must be a number")),
                ),
        )
        .subcommand(
            SubCommand::with_name("debug1")
                .about("🧮 Send controller factors (integral, proportional)")
                .arg(Arg::with_name("integral").required(true).allow_hyphen_values(true)
                    .validator(number_validator::<i32>("Integral factor must be an integer")))
                .arg(Arg::with_name("proportional").required(true).allow_hyphen_values(true)
                    .validator(number_validator::<i32>("Proportional factor must be an integer"))),
        )
        .subcommand(
            SubCommand::with_name("debug2")
                .about("🧭 Send controller status (combined error, target speed, status)")
                .arg(Arg::with_name("error").required(true).allow_hyphen_values(true)
                    .validator(number_validator::<i32>("Combined error must be an integer")))
                .arg(Arg::with_name("target").required(true).allow_hyphen_values(true)
                    .validator(number_validator::<i16>("Target speed must fit in 16 bits")))
                .arg(Arg::with_name("status").required(true)
                    .validator(number_validator::<u8>("Status must be 0-255"))),
        )
        .subcommand(
            SubCommand::with_name("perturb")
                .about("🎲 Change velocity perturbation at runtime")
                .arg(
                    Arg::with_name("rate")
                        .long("rate")
                        .value_name("HZ")
                        .help("Perturbation rate, 0 disables")
                        .takes_value(true)
                        .validator(number_validator::<u32>("Rate must be a non-negative integer")),
                )
                .arg(
                    Arg::with_name("magnitude")
                        .long("magnitude")
                        .value_name("FRACTION")
                        .help("Perturbation magnitude as a fraction of velocity")
                        .takes_value(true)
                        .validator(number_validator::<f64>("Magnitude must be a number")),
                ),
        )
        .subcommand(SubCommand::with_name("status").about("📊 Show simulator state"))
        .subcommand(
            SubCommand::with_name("drive")
                .about("🏁 Stream setpoint frames at a fixed rate and print telemetry")
                .arg(
                    Arg::with_name("setpoint")
                        .short("s")
                        .long("setpoint")
                        .takes_value(true)
                        .required(true)
                        .allow_hyphen_values(true)
                        .validator(number_validator::<f32>("Setpoint must be a number")),
                )
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .takes_value(true)
                        .default_value("100")
                        .validator(number_validator::<u32>("Count must be a positive integer")),
                )
                .arg(
                    Arg::with_name("rate")
                        .short("r")
                        .long("rate")
                        .value_name("HZ")
                        .takes_value(true)
                        .default_value("10")
                        .validator(number_validator::<u32>("Rate must be a positive integer")),
                ),
        )
        .subcommand(SubCommand::with_name("monitor").about("📈 Monitor the live telemetry stream"))
        .subcommand(
            SubCommand::with_name("offline")
                .about("🧪 Run the simulator in-process and print its log lines")
                .arg(
                    Arg::with_name("setpoint")
                        .short("s")
                        .long("setpoint")
                        .takes_value(true)
                        .required(true)
                        .allow_hyphen_values(true)
                        .validator(number_validator::<f32>("Setpoint must be a number")),
                )
                .arg(
                    Arg::with_name("ticks")
                        .short("t")
                        .long("ticks")
                        .takes_value(true)
                        .default_value("100")
                        .validator(number_validator::<u32>("Ticks must be a positive integer")),
                )
                .arg(Arg::with_name("config").short("c").long("config").value_name("FILE").takes_value(true))
                .arg(
                    Arg::with_name("seed")
                        .long("seed")
                        .takes_value(true)
                        .validator(number_validator::<u64>("Seed must be a number")),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let format = matches.value_of("format").unwrap_or("table");

    match matches.subcommand() {
        ("setpoint", Some(sub)) => {
            let value: f32 = required(sub, "value")?.parse()?;
            send_frame(host, port, frames::setpoint(value), format, "Setpoint", &format!("{:.1}%", value * 100.0)).await?;
        }
        ("debug1", Some(sub)) => {
            let integral: i32 = required(sub, "integral")?.parse()?;
            let proportional: i32 = required(sub, "proportional")?.parse()?;
            let frame = frames::diagnostic_one(integral, proportional);
            send_frame(host, port, frame, format, "Controller factors", &format!("I={} P={}", integral, proportional)).await?;
        }
        ("debug2", Some(sub)) => {
            let error: i32 = required(sub, "error")?.parse()?;
            let target: i16 = required(sub, "target")?.parse()?;
            let status: u8 = required(sub, "status")?.parse()?;
            let frame = frames::diagnostic_two(error, target, status);
            send_frame(host, port, frame, format, "Controller status", &format!("err={} target={} status={}", error, target, status)).await?;
        }
        ("perturb", Some(sub)) => handle_perturb(sub, host, port, format).await?,
        ("status", _) => handle_status(host, port, format).await?,
        ("drive", Some(sub)) => handle_drive(sub, host, port, format).await?,
        ("monitor", _) => handle_monitor(host, port, format).await?,
        ("offline", Some(sub)) => handle_offline(sub)?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

fn required<'a>(matches: &'a ArgMatches<'_>, name: &str) -> Result<&'a str, String> {
    matches.value_of(name).ok_or_else(|| format!("missing argument '{}'", name))
}

async fn connect(host: &str, port: u16) -> Result<TcpStream, Box<dyn std::error::Error>> {
    match TcpStream::connect((host, port)).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} Failed to connect to simulator at {}:{}", "❌".red(), host, port);
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin cruisesim-simulator".bright_cyan());
            }
            Err(e.into())
        }
    }
}

/// Read lines until a reply that is not broadcast telemetry arrives.
async fn read_reply(reader: &mut BufReader<OwnedReadHalf>) -> Result<ServerMessage, Box<dyn std::error::Error>> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = tokio::time::timeout(RESPONSE_TIMEOUT, reader.read_line(&mut line)).await??;
        if n == 0 {
            return Err("server closed connection".into());
        }
        match serde_json::from_str::<ServerMessage>(line.trim())? {
            ServerMessage::Telemetry { .. } => continue,
            reply => return Ok(reply),
        }
    }
}

async fn request(host: &str, port: u16, message: &ClientMessage) -> Result<ServerMessage, Box<dyn std::error::Error>> {
    let stream = connect(host, port).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(encode_line(message)?.as_bytes()).await?;
    read_reply(&mut reader).await
}

async fn send_frame(host: &str, port: u16, frame: BusFrame, format: &str, action: &str, value: &str) -> CliResult {
    let reply = request(host, port, &ClientMessage::Frame(frame)).await?;
    print_result(action, value, &reply, format)
}

async fn handle_perturb(matches: &ArgMatches<'_>, host: &str, port: u16, format: &str) -> CliResult {
    let rate_hz = matches.value_of("rate").map(str::parse::<u32>).transpose()?;
    let magnitude = matches.value_of("magnitude").map(str::parse::<f64>).transpose()?;
    if rate_hz.is_none() && magnitude.is_none() {
        println!("{}", "Nothing to change. Pass --rate and/or --magnitude.".yellow());
        return Ok(());
    }

    let reply = request(host, port, &ClientMessage::SetPerturbation { rate_hz, magnitude }).await?;
    let value = format!(
        "rate={} magnitude={}",
        rate_hz.map_or("-".to_string(), |r| r.to_string()),
        magnitude.map_or("-".to_string(), |m| m.to_string())
    );
    print_result("Perturbation", &value, &reply, format)
}

async fn handle_status(host: &str, port: u16, format: &str) -> CliResult {
    let reply = request(host, port, &ClientMessage::Status).await?;

    match (&reply, format) {
        (_, "json") => println!("{}", serde_json::to_string_pretty(&reply)?),
        (ServerMessage::Status(snapshot), "compact") => {
            println!(
                "tick={} v={:.2}m/s sp={:.1}%",
                snapshot.state.tick,
                snapshot.state.velocity,
                snapshot.state.setpoint * 100.0
            );
        }
        (ServerMessage::Status(snapshot), _) => {
            let state = &snapshot.state;
            println!("{}", "📊 Simulator Status".bright_blue().bold());
            println!("{} {}", "Tick:".bright_white(), state.tick);
            println!("{} {:.1}%", "Setpoint:".bright_white(), state.setpoint * 100.0);
            println!("{} {:.2} m/s", "Velocity:".bright_white(), state.velocity);
            println!("{} {:.2} rpm", "Wheel speed:".bright_white(), snapshot.rotational_rpm);
            println!(
                "{} {} Hz, ±{:.2}%",
                "Perturbation:".bright_white(),
                snapshot.perturbation_rate_hz,
                snapshot.perturbation_magnitude * 100.0
            );
            let d = &state.diagnostics;
            println!(
                "{} target={} P={} I={} err={} status={}",
                "Controller:".bright_white(),
                d.target_speed,
                d.proportional_factor,
                d.integral_factor,
                d.combined_error,
                d.status
            );
            let s = &snapshot.stats;
            println!(
                "{} setpoint={} diagnostic={} ignored={} telemetry={} log={}",
                "Frames:".bright_white(),
                s.setpoint_frames,
                s.diagnostic_frames,
                s.ignored_frames,
                s.telemetry_frames,
                s.log_lines
            );
        }
        (other, _) => print_result("Status", "", other, format)?,
    }

    Ok(())
}

async fn handle_drive(matches: &ArgMatches<'_>, host: &str, port: u16, format: &str) -> CliResult {
    let setpoint: f32 = required(matches, "setpoint")?.parse()?;
    let count: u32 = required(matches, "count")?.parse()?;
    let rate: u32 = required(matches, "rate")?.parse()?;
    if rate == 0 {
        return Err("rate must be non-zero".into());
    }

    let stream = connect(host, port).await?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(rate)));
    let frame_line = encode_line(&ClientMessage::Frame(frames::setpoint(setpoint)))?;

    println!(
        "{} {} frames at {:.1}% and {} Hz",
        "🏁 Driving:".bright_green().bold(),
        count,
        setpoint * 100.0,
        rate
    );

    let mut sent = 0;
    while sent < count {
        tokio::select! {
            _ = interval.tick() => {
                writer.write_all(frame_line.as_bytes()).await?;
                sent += 1;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => print_stream_line(&line, format),
                    None => return Err("server closed connection".into()),
                }
            }
        }
    }

    Ok(())
}

async fn handle_monitor(host: &str, port: u16, format: &str) -> CliResult {
    println!("{}", "📡 Monitoring telemetry (Press Ctrl+C to stop)...".bright_blue().bold());

    let stream = connect(host, port).await?;
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        print_stream_line(&line, format);
    }

    Ok(())
}

fn handle_offline(matches: &ArgMatches<'_>) -> CliResult {
    let setpoint: f32 = required(matches, "setpoint")?.parse()?;
    let ticks: u32 = required(matches, "ticks")?.parse()?;
    let config = match matches.value_of("config") {
        Some(path) => SimulatorConfig::from_json_file(path)?,
        None => SimulatorConfig::default(),
    };
    let source = match matches.value_of("seed") {
        Some(seed) => RngSource::seeded(seed.parse()?),
        None => RngSource::from_entropy(),
    };
    let converter = WheelRpm::from_params(&config.wheel);

    let mut simulator = Simulator::new(config, source, WriterSink::stdout(), converter)?;
    let frame = frames::setpoint(setpoint);
    for _ in 0..ticks {
        simulator.handle(&frame)?;
    }

    Ok(())
}

fn print_stream_line(line: &str, format: &str) {
    let message = match serde_json::from_str::<ServerMessage>(line) {
        Ok(message) => message,
        Err(_) => {
            println!("{}", line);
            return;
        }
    };

    match (message, format) {
        (_, "json") => println!("{}", line),
        (ServerMessage::Telemetry { decoded, .. }, "compact") => {
            println!("{:.2},{:.2}", decoded.velocity_mps, decoded.rotational_rpm);
        }
        (ServerMessage::Telemetry { decoded, .. }, _) => {
            println!(
                "{} {:>8.2} m/s {:>9.2} rpm",
                "📡".bright_blue(),
                decoded.velocity_mps,
                decoded.rotational_rpm
            );
        }
        (ServerMessage::Error { message }, _) => println!("{} {}", "❌".red(), message.bright_red()),
        _ => {}
    }
}

fn print_result(action: &str, value: &str, reply: &ServerMessage, format: &str) -> CliResult {
    match format {
        "json" => println!("{}", serde_json::to_string(reply)?),
        "compact" => match reply {
            ServerMessage::Error { message } => println!("{} {}", "ERR".red(), message),
            _ => println!("{}", "OK".bright_green()),
        },
        _ => match reply {
            ServerMessage::Error { message } => {
                println!("{} {} failed: {}", "❌".red(), action.bright_white(), message.bright_red());
            }
            _ => println!("{} {} {}", "✅".green(), action.bright_white(), value.bright_cyan()),
        },
    }
    Ok(())
}
