//! Command-line interface and REPL
//!
//! The REPL stands in for the training game: every line becomes a
//! [`ReplCommand`] executed against the router by the main loop.

use std::time::Duration;

use anyhow::{Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::debug;

use crate::device::Endpoint;
use crate::lumi::{wrap_payload_hex, Brightness, DeviceId, Mode, Rgb, RootKey, Scale};
use crate::router::{Delivery, NoteKind, NoteLength, SessionRouter};
use crate::theory;

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Key(RootKey, Scale),
    Color(Rgb),
    RootColor(Rgb),
    Brightness(Brightness),
    Mode(Mode),
    /// Highlight a key's scale over the configured range
    Highlight(Option<(RootKey, Scale)>),
    Clear,
    Flash(bool),
    Celebrate,
    Cancel,
    Note {
        kind: NoteKind,
        note: u8,
        length: NoteLength,
    },
    Hold(u8),
    Release(u8),
    ReleaseAll,
    Inputs(Vec<String>),
    Outputs(Vec<String>),
    /// Raw 8-byte payload, hex
    Send(String),
    Status,
    Help,
    Quit,
}

const HELP: &str = "\
  key <root>-<scale>          show key and scale (e.g. key A-minor)
  color <color>               primary color (name, #rrggbb or r,g,b)
  root-color <color>          root key color
  brightness <0|25|50|75|100> LED brightness
  mode <rainbow|single|piano|night>
  highlight [root-scale]      light the scale's keys over the highlight range
  clear                       turn the highlight range off
  flash <ok|wrong>            answer feedback flash
  celebrate | cancel          rainbow sweep / stop a running sequence
  challenge <note> [ms]       play a challenge note (never on lighting keyboards)
  feedback <note> [ms]        play a note on every output
  hold <note> | release <note> | release-all
  inputs <id,...> | outputs <id,...>
  send <8 hex bytes>          raw LUMI payload to lighting outputs
  status | help | quit";

fn parse_note(arg: Option<&str>) -> Result<u8> {
    let arg = arg.context("missing note")?;
    match arg.parse::<u8>() {
        Ok(n) if n <= 127 => Ok(n),
        Ok(n) => anyhow::bail!("note {} is out of range", n),
        Err(_) => Ok(theory::note_to_midi(arg)?),
    }
}

fn parse_length(arg: Option<&str>) -> Result<NoteLength> {
    match arg {
        None => Ok(NoteLength::Sustain),
        Some(ms) => {
            let ms: u64 = ms.parse().with_context(|| format!("invalid duration '{}'", ms))?;
            Ok(NoteLength::Duration(Duration::from_millis(ms)))
        }
    }
}

fn parse_ids(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Parse a REPL line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<ReplCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let mut args = rest.split_whitespace();

    let cmd = match verb.to_lowercase().as_str() {
        "key" => {
            let (root, scale) = theory::parse_key_signature(rest)?;
            ReplCommand::Key(root, scale)
        }
        "color" => ReplCommand::Color(rest.parse()?),
        "root-color" => ReplCommand::RootColor(rest.parse()?),
        "brightness" => ReplCommand::Brightness(rest.parse()?),
        "mode" => ReplCommand::Mode(rest.parse()?),
        "highlight" => {
            if rest.is_empty() {
                ReplCommand::Highlight(None)
            } else {
                ReplCommand::Highlight(Some(theory::parse_key_signature(rest)?))
            }
        }
        "clear" => ReplCommand::Clear,
        "flash" => match rest.to_lowercase().as_str() {
            "ok" | "correct" | "right" => ReplCommand::Flash(true),
            "wrong" | "incorrect" | "bad" => ReplCommand::Flash(false),
            other => anyhow::bail!("flash expects ok or wrong, got '{}'", other),
        },
        "celebrate" => ReplCommand::Celebrate,
        "cancel" => ReplCommand::Cancel,
        "challenge" | "feedback" => {
            let kind = if verb.eq_ignore_ascii_case("challenge") {
                NoteKind::Challenge
            } else {
                NoteKind::Feedback
            };
            let note = parse_note(args.next())?;
            let length = parse_length(args.next())?;
            ReplCommand::Note { kind, note, length }
        }
        "hold" => ReplCommand::Hold(parse_note(args.next())?),
        "release" => ReplCommand::Release(parse_note(args.next())?),
        "release-all" => ReplCommand::ReleaseAll,
        "inputs" => ReplCommand::Inputs(parse_ids(rest)),
        "outputs" => ReplCommand::Outputs(parse_ids(rest)),
        "send" => ReplCommand::Send(rest.to_string()),
        "status" => ReplCommand::Status,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => anyhow::bail!("unknown command '{}' (try help)", other),
    };
    Ok(Some(cmd))
}

/// Read lines on a blocking thread and forward parsed commands
///
/// The channel closes when the user quits or stdin ends.
pub fn spawn_repl(tx: mpsc::Sender<ReplCommand>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("REPL unavailable: {}", e);
                return;
            }
        };

        loop {
            match rl.readline("lumi> ") {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    match parse_command(&line) {
                        Ok(Some(ReplCommand::Help)) => println!("{}", HELP),
                        Ok(Some(cmd)) => {
                            let quit = cmd == ReplCommand::Quit;
                            if tx.blocking_send(cmd).is_err() || quit {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => println!("{} {:#}", "error:".red(), e),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    let _ = tx.blocking_send(ReplCommand::Quit);
                    break;
                }
                Err(e) => {
                    eprintln!("REPL error: {}", e);
                    break;
                }
            }
        }
    })
}

fn report(delivery: &Delivery) {
    if delivery.is_empty() {
        println!("  {}", "no matching outputs".dimmed());
        return;
    }
    for id in &delivery.delivered {
        println!("  {} {}", "✓".green(), id);
    }
    for (id, e) in &delivery.failed {
        println!("  {} {}: {}", "✗".red(), id, e);
    }
}

fn names(endpoints: &[Endpoint]) -> String {
    if endpoints.is_empty() {
        return "none".to_string();
    }
    endpoints
        .iter()
        .map(|ep| ep.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_status(router: &SessionRouter) {
    let session = router.session();

    println!("{}", "Session".bold());
    println!("  inputs:   {}", names(&session.active_inputs));
    println!("  outputs:  {}", names(&session.active_outputs));
    let lighting: Vec<&str> = session.lighting_outputs().map(|ep| ep.id.as_str()).collect();
    println!(
        "  lighting: {}",
        if lighting.is_empty() { "none".to_string() } else { lighting.join(", ") }
    );
    let sounding: Vec<String> = router
        .sounding_notes()
        .into_iter()
        .map(theory::note_name)
        .collect();
    if !sounding.is_empty() {
        println!("  holding:  {}", sounding.join(" "));
    }
    let display = router.display_state();
    if let (Some(root), Some(scale)) = (display.root_key, display.scale) {
        println!("  key:      {} {}", root, scale);
    }
}

/// Run one command; returns false when the REPL asked to quit
pub fn execute(
    router: &SessionRouter,
    cmd: ReplCommand,
    highlight_range: (u8, u8),
    device_id: DeviceId,
) -> Result<bool> {
    debug!("REPL: {:?}", cmd);
    let (low, high_exclusive) = highlight_range;

    match cmd {
        ReplCommand::Key(root, scale) => report(&router.configure_key_scale(root, scale)),
        ReplCommand::Color(c) => {
            report(&router.set_primary_color(c.r as i32, c.g as i32, c.b as i32))
        }
        ReplCommand::RootColor(c) => {
            report(&router.set_root_color(c.r as i32, c.g as i32, c.b as i32))
        }
        ReplCommand::Brightness(level) => report(&router.set_brightness(level)),
        ReplCommand::Mode(mode) => report(&router.set_mode(mode)),
        ReplCommand::Highlight(key) => {
            let display = router.display_state();
            let (root, scale) = key
                .or(display.root_key.zip(display.scale))
                .context("no key set; use 'highlight C-major' or 'key' first")?;
            let classes = theory::scale_note_classes(root, scale);
            report(&router.highlight_scale(&classes, low, high_exclusive));
        }
        ReplCommand::Clear => report(&router.clear_range(low, high_exclusive)),
        ReplCommand::Flash(correct) => {
            router.flash_feedback(correct);
        }
        ReplCommand::Celebrate => {
            router.celebrate();
        }
        ReplCommand::Cancel => {
            if !router.cancel_sequence() {
                println!("  {}", "nothing playing".dimmed());
            }
        }
        ReplCommand::Note { kind, note, length } => {
            let velocity = router.settings().velocity;
            report(&router.route_note(kind, note, velocity, length));
        }
        ReplCommand::Hold(note) => report(&router.start_sustain(note)),
        ReplCommand::Release(note) => report(&router.stop_sustain(note)),
        ReplCommand::ReleaseAll => report(&router.stop_all_sustain()),
        ReplCommand::Inputs(ids) => {
            router.set_active_inputs(ids);
            print_status(router);
        }
        ReplCommand::Outputs(ids) => {
            router.set_active_outputs(ids);
            print_status(router);
        }
        ReplCommand::Send(payload) => {
            let frame = wrap_payload_hex(&payload, device_id)?;
            println!("  {}", frame.to_string().bright_magenta());
            report(&router.send_frame(&frame));
        }
        ReplCommand::Status => print_status(router),
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Quit => return Ok(false),
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lumi::palette;

    fn parse(line: &str) -> ReplCommand {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn test_parse_lighting_commands() {
        assert_eq!(parse("key A-minor"), ReplCommand::Key(RootKey::A, Scale::Minor));
        assert_eq!(parse("color brightblue"), ReplCommand::Color(palette::BRIGHT_BLUE));
        assert_eq!(parse("root-color 255,0,0"), ReplCommand::RootColor(Rgb::new(255, 0, 0)));
        assert_eq!(parse("brightness 50"), ReplCommand::Brightness(Brightness::Half));
        assert_eq!(parse("MODE piano"), ReplCommand::Mode(Mode::Piano));
        assert_eq!(parse("highlight"), ReplCommand::Highlight(None));
        assert_eq!(
            parse("highlight G-major"),
            ReplCommand::Highlight(Some((RootKey::G, Scale::Major)))
        );
        assert_eq!(parse("flash ok"), ReplCommand::Flash(true));
        assert_eq!(parse("flash wrong"), ReplCommand::Flash(false));
    }

    #[test]
    fn test_parse_note_commands() {
        assert_eq!(
            parse("challenge C4 800"),
            ReplCommand::Note {
                kind: NoteKind::Challenge,
                note: 60,
                length: NoteLength::Duration(Duration::from_millis(800)),
            }
        );
        assert_eq!(
            parse("feedback 64"),
            ReplCommand::Note {
                kind: NoteKind::Feedback,
                note: 64,
                length: NoteLength::Sustain,
            }
        );
        assert_eq!(parse("hold Bb3"), ReplCommand::Hold(58));
        assert_eq!(parse("release 58"), ReplCommand::Release(58));
    }

    #[test]
    fn test_parse_selection_and_misc() {
        assert_eq!(
            parse("outputs LUMI Keys, Digital Piano"),
            ReplCommand::Outputs(vec!["LUMI Keys".into(), "Digital Piano".into()])
        );
        assert_eq!(parse("inputs"), ReplCommand::Inputs(vec![]));
        assert_eq!(parse("exit"), ReplCommand::Quit);
        assert!(parse_command("   ").unwrap().is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("dance").is_err());
        assert!(parse_command("key H-major").is_err());
        assert!(parse_command("brightness 60").is_err());
        assert!(parse_command("challenge 200").is_err());
        assert!(parse_command("challenge C4 soon").is_err());
        assert!(parse_command("flash maybe").is_err());
    }

    #[test]
    fn test_execute_without_devices() {
        let router = SessionRouter::new(Default::default());
        let range = (48, 85);

        assert!(execute(&router, ReplCommand::Key(RootKey::E, Scale::Blues), range, DeviceId::DEFAULT).unwrap());
        assert_eq!(router.display_state().root_key, Some(RootKey::E));

        // Falls back to the key just set
        assert!(execute(&router, ReplCommand::Highlight(None), range, DeviceId::DEFAULT).unwrap());
        assert!(router.display_state().highlight.is_some());

        assert!(execute(&router, ReplCommand::Send("10 40 22 00".into()), range, DeviceId::DEFAULT).is_err());
        assert!(!execute(&router, ReplCommand::Quit, range, DeviceId::DEFAULT).unwrap());
    }
}
