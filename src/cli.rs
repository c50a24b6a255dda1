//! Command-line interface and REPL
//!
//! Lines are parsed into [`ReplCommand`]s and executed against the engine. `sim`
//! commands play the amp's part by injecting notifications into the transport.

use crate::engine::{EngineHandle, MirrorSnapshot};
use crate::transport::{Notification, NotificationInjector, RawDeviceMessage, RawDeviceState};
use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const PROMPT: &str = "amp> ";

/// Device-side events that can be simulated from the prompt
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    Connected,
    Failed,
    Channel(u8),
    Param { dsp_id: String, index: u32, value: f32 },
    FxType { old: String, new: String },
    /// A whole driver state payload, as JSON
    Raw(RawDeviceState),
}

impl SimCommand {
    /// Classified the same way as payloads coming from a driver
    fn into_notifications(self) -> Vec<Notification> {
        let message = match self {
            SimCommand::Connected => {
                return Notification::from_connection_status("connected").into_iter().collect()
            }
            SimCommand::Failed => {
                return Notification::from_connection_status("failed").into_iter().collect()
            }
            SimCommand::Raw(state) => return state.into_notifications(),
            SimCommand::Channel(channel) => RawDeviceMessage {
                preset_number: Some(channel),
                ..Default::default()
            },
            SimCommand::Param {
                dsp_id,
                index,
                value,
            } => RawDeviceMessage {
                dsp_id: Some(dsp_id),
                index: Some(index),
                value: Some(value),
                ..Default::default()
            },
            SimCommand::FxType { old, new } => RawDeviceMessage {
                dsp_id_old: Some(old),
                dsp_id_new: Some(new),
                ..Default::default()
            },
        };

        RawDeviceState {
            preset_config: None,
            last_message_received: Some(message),
        }
        .into_notifications()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Show,
    /// List catalog entries, optionally of one category
    Catalog(Option<String>),
    Devices,
    Scan,
    /// Connect to a device from the list by position
    Connect(usize),
    /// Connect to the last connected device
    ConnectLast,
    Last,
    Preset,
    /// Send the mirrored tone back to the amp
    Apply,
    Channel(u8),
    Fx { slot: usize, type_id: String },
    Amp { slot: usize, type_id: String },
    /// Index and value stay text; the engine coerces them
    Param { slot: usize, index: String, value: String },
    Toggle { slot: usize, enabled: bool },
    Name,
    Serial,
    Sim(SimCommand),
    Quit,
}

fn arg<'a>(args: &[&'a str], i: usize, what: &str) -> Result<&'a str> {
    args.get(i).copied().ok_or_else(|| anyhow!("missing {}", what))
}

fn num<T: std::str::FromStr>(args: &[&str], i: usize, what: &str) -> Result<T> {
    let raw = arg(args, i, what)?;
    raw.parse()
        .map_err(|_| anyhow!("invalid {}: '{}'", what, raw))
}

impl ReplCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, args)) = parts.split_first() else {
            return Ok(None);
        };

        let cmd = match head.to_ascii_lowercase().as_str() {
            "help" | "?" => ReplCommand::Help,
            "show" | "state" => ReplCommand::Show,
            "catalog" => ReplCommand::Catalog(args.first().map(|s| s.to_string())),
            "devices" => ReplCommand::Devices,
            "scan" => ReplCommand::Scan,
            "connect" => match arg(args, 0, "device number")? {
                "last" => ReplCommand::ConnectLast,
                _ => ReplCommand::Connect(num(args, 0, "device number")?),
            },
            "last" => ReplCommand::Last,
            "preset" => ReplCommand::Preset,
            "apply" => ReplCommand::Apply,
            "channel" => ReplCommand::Channel(num(args, 0, "channel")?),
            "fx" => ReplCommand::Fx {
                slot: num(args, 0, "slot")?,
                type_id: arg(args, 1, "effect id")?.to_string(),
            },
            "amp" => ReplCommand::Amp {
                slot: num(args, 0, "slot")?,
                type_id: arg(args, 1, "amp id")?.to_string(),
            },
            "param" => ReplCommand::Param {
                slot: num(args, 0, "slot")?,
                index: arg(args, 1, "parameter index")?.to_string(),
                value: arg(args, 2, "value")?.to_string(),
            },
            "toggle" => ReplCommand::Toggle {
                slot: num(args, 0, "slot")?,
                enabled: match arg(args, 1, "on/off")? {
                    "on" | "1" | "true" => true,
                    "off" | "0" | "false" => false,
                    other => bail!("expected on/off, got '{}'", other),
                },
            },
            "name" => ReplCommand::Name,
            "serial" => ReplCommand::Serial,
            "sim" => ReplCommand::Sim(Self::parse_sim(args)?),
            "quit" | "exit" => ReplCommand::Quit,
            other => bail!("unknown command '{}' (try 'help')", other),
        };

        Ok(Some(cmd))
    }

    fn parse_sim(args: &[&str]) -> Result<SimCommand> {
        let (&kind, rest) = args
            .split_first()
            .ok_or_else(|| anyhow!("missing sim event"))?;

        Ok(match kind {
            "connected" => SimCommand::Connected,
            "failed" => SimCommand::Failed,
            "channel" => SimCommand::Channel(num(rest, 0, "channel")?),
            "param" => SimCommand::Param {
                dsp_id: arg(rest, 0, "effect id")?.to_string(),
                index: num(rest, 1, "parameter index")?,
                value: num(rest, 2, "value")?,
            },
            "fxtype" => SimCommand::FxType {
                old: arg(rest, 0, "old effect id")?.to_string(),
                new: arg(rest, 1, "new effect id")?.to_string(),
            },
            "raw" => {
                if rest.is_empty() {
                    bail!("missing device state JSON");
                }
                SimCommand::Raw(
                    serde_json::from_str(&rest.join(" ")).context("invalid device state JSON")?,
                )
            }
            other => bail!("unknown sim event '{}'", other),
        })
    }
}

fn print_help() {
    println!("\n{}", "Commands:".bold());
    let rows = [
        ("show", "print the mirrored device state"),
        ("catalog [category]", "list known effects"),
        ("devices | scan", "list / scan for amps"),
        ("connect <n> | connect last", "connect to a listed or the last amp"),
        ("last", "show the last connected amp"),
        ("preset | apply", "fetch the active preset / send the mirrored one"),
        ("channel <n>", "switch hardware channel"),
        ("fx <slot> <id> | amp <slot> <id>", "change effect / amp model"),
        ("param <slot> <index> <value>", "set a parameter"),
        ("toggle <slot> on|off", "switch an effect"),
        ("name | serial", "query device name / serial"),
        ("sim connected|failed", "amp reports a connection result"),
        ("sim channel <n>", "amp reports a channel change"),
        ("sim param <id> <index> <value>", "amp reports a knob move"),
        ("sim fxtype <old> <new>", "amp reports an effect swap"),
        ("sim raw <json>", "amp sends a raw driver state payload"),
        ("quit", "exit"),
    ];
    for (usage, what) in rows {
        println!("  {:<36} {}", usage.yellow(), what);
    }
}

/// Print the mirror in a compact form
pub fn print_snapshot(snapshot: &MirrorSnapshot) {
    let conn = &snapshot.connection;
    println!(
        "\n{} {:?}{}",
        "Connection:".bold(),
        conn.state,
        conn.connected_device
            .as_ref()
            .map(|d| format!(" to {} ({})", d.name, d.address))
            .unwrap_or_default()
    );
    if let Some(attempt) = conn.last_attempted.as_ref().filter(|d| d.connection_failed) {
        println!("  {} {}", "last attempt failed:".red(), attempt.name);
    }
    println!(
        "{} {}   {} {}",
        "Channel:".bold(),
        snapshot
            .selected_channel
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string()),
        "Last command:".bold(),
        snapshot.last_command
    );

    let Some(tone) = snapshot.tone.as_ref() else {
        println!("{}", "No preset loaded".dimmed());
        return;
    };

    println!("{} {}", "Preset:".bold(), tone.name.green());
    for (slot, fx) in tone.fx.iter().enumerate() {
        let state = if fx.enabled { "on ".green() } else { "off".dimmed() };
        let params = fx
            .params
            .iter()
            .map(|p| {
                format!(
                    "{}={:.2}",
                    p.name.as_deref().unwrap_or(p.param_id.as_str()),
                    p.value
                )
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!("  [{}] {} {:<16} {}", slot, state, fx.name.cyan(), params);
    }
}

/// Run one command. Returns false when the REPL should exit.
pub async fn execute(
    engine: &EngineHandle,
    injector: &NotificationInjector,
    cmd: ReplCommand,
) -> Result<bool> {
    debug!(?cmd, "REPL command");

    match cmd {
        ReplCommand::Help => print_help(),
        ReplCommand::Show => print_snapshot(&engine.snapshot()),
        ReplCommand::Catalog(category) => {
            let snapshot = engine.snapshot();
            for entry in snapshot
                .catalog
                .entries()
                .iter()
                .filter(|e| category.as_deref().map_or(true, |c| e.category == c))
            {
                println!(
                    "  {:<8} {:<32} {}",
                    entry.category.yellow(),
                    entry.type_id,
                    entry.name.cyan()
                );
            }
        }
        ReplCommand::Devices => {
            let snapshot = engine.snapshot();
            if snapshot.scan_in_progress {
                println!("{}", "Scan in progress...".dimmed());
            }
            for (i, device) in snapshot.devices.iter().enumerate() {
                println!("  {} {} ({})", i, device.name.cyan(), device.address);
            }
        }
        ReplCommand::Scan => engine.scan().await?,
        ReplCommand::Connect(n) => {
            let device = engine
                .snapshot()
                .devices
                .get(n)
                .cloned()
                .with_context(|| format!("no device #{} (run 'scan' first)", n))?;
            engine.connect(device).await?;
        }
        ReplCommand::ConnectLast => {
            let device = engine
                .last_connected_device()
                .context("no device has been connected yet")?;
            engine.connect(device).await?;
        }
        ReplCommand::Last => match engine.last_connected_device() {
            Some(d) => println!("  {} ({})", d.name.cyan(), d.address),
            None => println!("{}", "No device connected yet".dimmed()),
        },
        ReplCommand::Preset => engine.request_preset().await?,
        ReplCommand::Apply => {
            let tone = engine.snapshot().tone.context("no preset loaded")?;
            engine.apply_preset((*tone).clone()).await?;
        }
        ReplCommand::Channel(channel) => engine.set_channel(channel).await?,
        ReplCommand::Fx { slot, type_id } => engine.change_fx_type(slot, type_id).await?,
        ReplCommand::Amp { slot, type_id } => engine.change_amp(slot, type_id).await?,
        ReplCommand::Param { slot, index, value } => engine.set_param(slot, index, value).await?,
        ReplCommand::Toggle { slot, enabled } => engine.toggle_fx(slot, enabled).await?,
        ReplCommand::Name => engine.request_device_name().await?,
        ReplCommand::Serial => engine.request_device_serial().await?,
        ReplCommand::Sim(sim) => {
            let notifications = sim.into_notifications();
            if notifications.is_empty() {
                bail!("payload does not describe a device event");
            }
            for notification in notifications {
                if !injector.inject(notification) {
                    bail!("engine is not listening for notifications");
                }
            }
        }
        ReplCommand::Quit => return Ok(false),
    }

    Ok(true)
}

/// Read lines on a blocking thread so the runtime keeps serving the engine
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::task::spawn_blocking(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                warn!("Failed to start line editor: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    warn!("Readline error: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

/// Interactive loop; returns on `quit`, end of input, or `shutdown`
pub async fn run_repl(
    engine: EngineHandle,
    injector: NotificationInjector,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    println!(
        "{} {}",
        "Amp Link".bold().cyan(),
        "- type 'help' for commands".dimmed()
    );

    let mut lines = spawn_line_reader();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = &mut shutdown => break,
        };

        match ReplCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(cmd)) => match execute(&engine, &injector, cmd).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => println!("{} {:#}", "error:".red().bold(), e),
            },
            Err(e) => println!("{} {:#}", "error:".red().bold(), e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ReplCommand {
        ReplCommand::parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(ReplCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_intent_commands() {
        assert_eq!(parse("channel 2"), ReplCommand::Channel(2));
        assert_eq!(
            parse("fx 4 Flanger"),
            ReplCommand::Fx {
                slot: 4,
                type_id: "Flanger".to_string()
            }
        );
        assert_eq!(
            parse("param 3 0 0.35"),
            ReplCommand::Param {
                slot: 3,
                index: "0".to_string(),
                value: "0.35".to_string()
            }
        );
        assert_eq!(
            parse("toggle 1 off"),
            ReplCommand::Toggle {
                slot: 1,
                enabled: false
            }
        );
        assert_eq!(parse("connect 0"), ReplCommand::Connect(0));
        assert_eq!(parse("connect last"), ReplCommand::ConnectLast);
        assert_eq!(parse("CATALOG amp"), ReplCommand::Catalog(Some("amp".to_string())));
        assert_eq!(parse("exit"), ReplCommand::Quit);
    }

    #[test]
    fn test_sim_commands() {
        assert_eq!(parse("sim channel 3"), ReplCommand::Sim(SimCommand::Channel(3)));
        assert_eq!(
            parse("sim param Twin 1 0.75"),
            ReplCommand::Sim(SimCommand::Param {
                dsp_id: "Twin".to_string(),
                index: 1,
                value: 0.75
            })
        );
        assert_eq!(
            SimCommand::FxType {
                old: "Twin".to_string(),
                new: "94MatchDCV2".to_string()
            }
            .into_notifications(),
            vec![Notification::FxTypeChanged {
                dsp_id_old: "Twin".to_string(),
                dsp_id_new: "94MatchDCV2".to_string()
            }]
        );
        assert_eq!(
            SimCommand::Channel(2).into_notifications(),
            vec![Notification::ChannelChanged { channel: 2 }]
        );
        assert_eq!(
            SimCommand::Failed.into_notifications(),
            vec![Notification::Connection(crate::transport::ConnectionEvent::Failed)]
        );
    }

    #[test]
    fn test_sim_raw_payload_is_classified() {
        let ReplCommand::Sim(sim) =
            parse(r#"sim raw {"lastMessageReceived": {"dspId": "Twin", "index": 1, "value": 0.5}}"#)
        else {
            panic!("expected a sim command");
        };
        assert_eq!(
            sim.into_notifications(),
            vec![Notification::ParamChanged {
                dsp_id: "Twin".to_string(),
                index: 1,
                value: 0.5
            }]
        );

        assert!(ReplCommand::parse("sim raw").is_err());
        assert!(ReplCommand::parse("sim raw {not json").is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(ReplCommand::parse("channel").is_err());
        assert!(ReplCommand::parse("channel two").is_err());
        assert!(ReplCommand::parse("toggle 1 maybe").is_err());
        assert!(ReplCommand::parse("param 3 0").is_err());
        assert!(ReplCommand::parse("sim").is_err());
        assert!(ReplCommand::parse("sim param Twin x 0.5").is_err());
        assert!(ReplCommand::parse("dance").is_err());
    }
}
