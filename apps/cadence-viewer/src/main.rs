//! Cadence Demo Viewer
//!
//! Draws a world-space scene of coloured meshes and textured sprites with a
//! pannable camera, plus a screen-space overlay. The sprite texture is
//! regenerated every few seconds and the old one retired while frames that
//! sample it may still be in flight.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p cadence-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--vsync`: Enable vsync
//! - `--width <N>`: Initial window width (default: 1280)
//! - `--height <N>`: Initial window height (default: 720)
//! - `-h, --help`: Print help message
//!
//! ## Controls
//!
//! - Arrow keys: pan the camera
//! - `PageUp` / `PageDown`: zoom
//! - Escape: quit
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use cadence_app::{run_app, AppConfig};
use cadence_core::Colour;

use crate::app::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// Options from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Options {
    vsync: bool,
    width: u32,
    height: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            vsync: false,
            width: WIDTH,
            height: HEIGHT,
        }
    }
}

impl Options {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut options = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--vsync" => options.vsync = true,
                flag @ ("--width" | "--height") => {
                    let value: u32 = args
                        .get(i + 1)
                        .ok_or_else(|| anyhow::anyhow!("{flag} needs a value"))?
                        .parse()
                        .map_err(|e| anyhow::anyhow!("invalid {flag}: {e}"))?;
                    if value == 0 {
                        anyhow::bail!("{flag} must be positive");
                    }
                    if flag == "--width" {
                        options.width = value;
                    } else {
                        options.height = value;
                    }
                    i += 1;
                }
                other => anyhow::bail!("unknown option {other}; see --help"),
            }
            i += 1;
        }

        Ok(options)
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Check for help flag before starting the app
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let options = Options::parse(&args)?;

    run_app::<Viewer>(
        AppConfig::new("Cadence - Demo Viewer")
            .with_size(options.width, options.height)
            .with_vsync(options.vsync)
            .with_clear_colour(Colour::from_rgba8(24, 26, 32, 255)),
    )
}

fn print_help() {
    eprintln!(
        "Cadence Demo Viewer

USAGE:
    cargo run -p cadence-viewer -- [OPTIONS]

OPTIONS:
    --vsync                 Enable vsync
    --width <N>             Initial window width (default: {WIDTH})
    --height <N>            Initial window height (default: {HEIGHT})
    -h, --help              Print this help message

CONTROLS:
    Arrow keys              Pan the camera
    PageUp / PageDown       Zoom in / out
    Escape                  Quit

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("cadence-viewer")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_without_flags() {
        assert_eq!(Options::parse(&args(&[])).unwrap(), Options::default());
    }

    #[test]
    fn parses_size_and_vsync() {
        let options = Options::parse(&args(&["--width", "800", "--vsync", "--height", "600"])).unwrap();
        assert_eq!(
            options,
            Options {
                vsync: true,
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Options::parse(&args(&["--width"])).is_err());
        assert!(Options::parse(&args(&["--height", "tall"])).is_err());
        assert!(Options::parse(&args(&["--width", "0"])).is_err());
        assert!(Options::parse(&args(&["--fullscreen"])).is_err());
    }
}
