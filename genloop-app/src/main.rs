//! Composition binary: loads configuration, builds the engine, wires a
//! MIDI adapter, and runs until told to quit. Grounded on the teacher's
//! `imbolc-ui` binary's logging/startup shape, without its TUI.

use std::io::BufRead;
use std::sync::Arc;

use genloop_core::load_config;
use genloop_engine::Engine;
use genloop_midi::{default_mapping, MidiInputAdapter, MidiOutputAdapter};

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("genloop")
        .join("genloop.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::File::create(&log_path)
        .unwrap_or_else(|_| std::fs::File::create("/tmp/genloop.log").expect("cannot create log file"));

    WriteLogger::init(log_level, Config::default(), log_file).expect("failed to initialize logger");
    log::info!("genloop starting (log level: {:?})", log_level);
}

fn select_port(label: &str, ports: &[String]) -> Option<usize> {
    if ports.is_empty() {
        log::warn!(target: "genloop_app", "no {label} MIDI ports available");
        return None;
    }
    for (i, name) in ports.iter().enumerate() {
        log::info!(target: "genloop_app", "{label} port {i}: {name}");
    }
    Some(0)
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!(target: "genloop_app", "config error: {e}");
            eprintln!("config error: {e}");
            std::process::exit(1);
        }
    };

    let output_ports = MidiOutputAdapter::list_ports();
    let sink: Arc<dyn genloop_types::MidiOutSink> = match select_port("output", &output_ports) {
        Some(idx) => match MidiOutputAdapter::connect(idx) {
            Ok(adapter) => Arc::new(adapter),
            Err(e) => {
                log::error!(target: "genloop_app", "failed to connect MIDI output: {e}");
                eprintln!("failed to connect MIDI output: {e}");
                std::process::exit(1);
            }
        },
        None => {
            log::warn!(target: "genloop_app", "running with no MIDI output connected");
            Arc::new(NullSink)
        }
    };

    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0xC0FFEE);

    let engine = match Engine::build(&cfg, sink, seed) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!(target: "genloop_app", "failed to build engine: {e}");
            eprintln!("failed to build engine: {e}");
            std::process::exit(1);
        }
    };
    engine.start();
    log::info!(target: "genloop_app", "engine running");

    let mut input = MidiInputAdapter::new(default_mapping());
    input.refresh_ports();
    let input_ports: Vec<String> = input.list_ports().iter().map(|p| p.name.clone()).collect();
    if let Some(idx) = select_port("input", &input_ports) {
        if let Err(e) = input.connect(idx) {
            log::error!(target: "genloop_app", "failed to connect MIDI input: {e}");
        }
    }

    let interaction = engine.interaction_sink();
    let trigger = engine.manual_trigger();
    let scale_count = cfg.scales.len().max(1);
    let handler = genloop_core::ActionHandler::new(
        engine.state.clone(),
        interaction,
        Some(trigger),
        scale_count,
    );

    eprintln!("genloop running. Press Enter to quit.");
    let stdin = std::io::stdin();
    let reader_handle = std::thread::spawn(move || {
        let mut line = String::new();
        let _ = stdin.lock().read_line(&mut line);
    });

    loop {
        if reader_handle.is_finished() {
            break;
        }
        for event in input.poll_events() {
            handler.handle(&event);
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    log::info!(target: "genloop_app", "shutting down");
    engine.shutdown();
}

struct NullSink;
impl genloop_types::MidiOutSink for NullSink {
    fn note_on(&self, _note: u8, _velocity: u8, _channel: u8) {}
    fn note_off(&self, _note: u8, _channel: u8) {}
    fn control_change(&self, _cc: genloop_types::ControlChangeEvent) {}
}
