//! MIDI monitor and port listing for debugging
//!
//! Prints incoming traffic with LUMI frames decoded back into commands.

use anyhow::Result;
use colored::*;
use midir::{Ignore, MidiInput, MidiInputConnection};
use tokio::sync::mpsc;
use tracing::info;

use crate::device::{Direction, Endpoint};
use crate::lumi::{self, Command, Frame, FRAME_LEN, KEY_COLOR_MESSAGE_TYPE};
use crate::midi::{format_hex, MidiMessage};
use crate::theory::note_name;
use crate::transport::midir::MidirTransport;

/// Captured MIDI message
#[derive(Debug, Clone)]
pub struct MonitorEvent {
    pub timestamp: chrono::DateTime<chrono::Local>,
    pub port_name: String,
    pub data: Vec<u8>,
}

/// Human-readable meaning of a raw message
pub fn describe(data: &[u8]) -> String {
    if lumi::is_lumi_sysex(data) {
        return describe_lumi(data);
    }
    match MidiMessage::parse(data) {
        Some(MidiMessage::NoteOn { channel, note, velocity }) => {
            format!("NoteOn ch:{} {} v:{}", channel + 1, note_name(note), velocity)
        }
        Some(MidiMessage::NoteOff { channel, note, .. }) => {
            format!("NoteOff ch:{} {}", channel + 1, note_name(note))
        }
        Some(msg) => msg.to_string(),
        None => "?".to_string(),
    }
}

fn describe_lumi(data: &[u8]) -> String {
    if data.len() == 10 && data[4] == KEY_COLOR_MESSAGE_TYPE {
        return format!(
            "LUMI key {} -> rgb({}, {}, {})",
            note_name(data[5]),
            data[6],
            data[7],
            data[8]
        );
    }

    if data.len() != FRAME_LEN {
        return format!("LUMI SysEx ({} bytes)", data.len());
    }

    match Frame::parse(data) {
        Ok(frame) => match Command::identify(&frame.payload()) {
            Some(cmd) => format!("LUMI #{} {}", frame.device_id().value(), cmd),
            None => format!("LUMI #{} unknown payload", frame.device_id().value()),
        },
        Err(e) => format!("LUMI {}", e),
    }
}

fn color_for(data: &[u8]) -> Color {
    if lumi::is_lumi_sysex(data) {
        return Color::BrightMagenta;
    }
    match MidiMessage::parse(data) {
        Some(MidiMessage::NoteOn { .. }) => Color::BrightGreen,
        Some(MidiMessage::NoteOff { .. }) => Color::BrightRed,
        Some(MidiMessage::ControlChange { .. }) => Color::BrightYellow,
        Some(_) => Color::BrightCyan,
        None => Color::BrightBlack,
    }
}

fn print_event(event: &MonitorEvent) {
    let port = if event.port_name.chars().count() > 20 {
        format!("{}...", event.port_name.chars().take(17).collect::<String>())
    } else {
        event.port_name.clone()
    };

    println!(
        "[{}] {:20} | {} => {}",
        event.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
        port.white(),
        format_hex(&event.data).color(color_for(&event.data)),
        describe(&event.data).bright_blue()
    );
}

fn connect(
    client_name: &str,
    pattern: Option<&str>,
    tx: mpsc::Sender<MonitorEvent>,
) -> Result<Vec<MidiInputConnection<()>>> {
    let scan = MidiInput::new(client_name)?;
    let names: Vec<String> = scan
        .ports()
        .iter()
        .filter_map(|p| scan.port_name(p).ok())
        .filter(|name| {
            pattern.map_or(true, |p| name.to_lowercase().contains(&p.to_lowercase()))
        })
        .collect();

    let mut connections = Vec::new();
    for name in names {
        let mut midi_in = MidiInput::new(client_name)?;
        // SysEx is what we are here for
        midi_in.ignore(Ignore::None);
        let Some(port) = crate::midi::find_port_by_substring(&midi_in, &name) else {
            continue;
        };

        let tx = tx.clone();
        let port_name = name.clone();
        let conn = midi_in
            .connect(
                &port,
                "monitor",
                move |_stamp, data, _| {
                    let _ = tx.try_send(MonitorEvent {
                        timestamp: chrono::Local::now(),
                        port_name: port_name.clone(),
                        data: data.to_vec(),
                    });
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", name, e))?;
        info!("Monitoring: {}", name);
        connections.push(conn);
    }

    if connections.is_empty() {
        anyhow::bail!(
            "No MIDI input ports found{}",
            pattern.map(|p| format!(" matching '{}'", p)).unwrap_or_default()
        );
    }
    Ok(connections)
}

/// Print traffic from matching input ports until Ctrl+C
pub async fn run_monitor(client_name: &str, pattern: Option<&str>) -> Result<()> {
    println!("{}", "=== MIDI Monitor ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    let (tx, mut rx) = mpsc::channel(1000);
    let _connections = connect(&format!("{}-monitor", client_name), pattern, tx)?;

    println!("{}", "Format: [time] PORT | HEX => DECODED".dimmed());
    println!("{}\n", "─".repeat(80).dimmed());

    loop {
        tokio::select! {
            Some(event) = rx.recv() => print_event(&event),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("\n{}", "Monitor stopped".yellow());
    Ok(())
}

fn print_endpoints(title: &str, endpoints: &[&Endpoint]) {
    println!("\n{}", title.bold());
    if endpoints.is_empty() {
        println!("  {}", "None found".dimmed());
        return;
    }
    for ep in endpoints {
        let marker = if ep.lighting {
            "[LIGHTING]".bright_magenta()
        } else {
            format!("[{}]", ep.kind.to_string().to_uppercase()).green()
        };
        println!("  {} {}", marker, ep.name);
    }
}

/// List all ports with their classification
pub fn list_ports(transport: &MidirTransport) -> Result<()> {
    let endpoints = transport.enumerate()?;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());
    let inputs: Vec<&Endpoint> = endpoints
        .iter()
        .filter(|ep| ep.direction == Direction::Input)
        .collect();
    let outputs: Vec<&Endpoint> = endpoints
        .iter()
        .filter(|ep| ep.direction == Direction::Output)
        .collect();
    print_endpoints("Input Ports:", &inputs);
    print_endpoints("Output Ports:", &outputs);
    println!();
    Ok(())
}
