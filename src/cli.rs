//! The command-line front-end. Selects mode, memory size, entry point, and
//! an optional external page-table base, then hands a `PathBuf` to the
//! image loader.

use std::path::PathBuf;

use clap::Parser;

use crate::boot::VmMode;

/// Parses a numeric literal as decimal, `0x`-prefixed hex, or (a leading
/// `0` followed by more digits) octal — the three forms accepted for
/// `-m`/`-e`/`-p`.
fn parse_numeric(raw: &str) -> std::result::Result<u64, String> {
    let s = raw.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else if s.len() > 1 && s.starts_with('0') {
        u64::from_str_radix(&s[1..], 8).map_err(|e| e.to_string())
    } else {
        s.parse::<u64>().map_err(|e| e.to_string())
    }
}

const DEFAULT_MEM_BYTES: u64 = 1 << 20;

#[derive(Parser, Debug)]
#[command(name = "blankvm", about = "Boot a raw flat image under KVM and bridge its serial port to stdio")]
pub struct Cli {
    /// Select Real mode (default).
    #[arg(short = 'R', long, conflicts_with_all = ["protected", "long"])]
    pub real: bool,

    /// Select Protected mode.
    #[arg(short = 'P', long, conflicts_with_all = ["real", "long"])]
    pub protected: bool,

    /// Select Long mode.
    #[arg(short = 'L', long, conflicts_with_all = ["real", "protected"])]
    pub long: bool,

    /// Guest RAM size in bytes. Accepts decimal, `0x` hex, or `0` octal.
    #[arg(short = 'm', long = "mem", value_parser = parse_numeric, default_value_t = DEFAULT_MEM_BYTES)]
    pub mem_bytes: u64,

    /// Guest entry point address.
    #[arg(short = 'e', long = "entry", value_parser = parse_numeric, default_value_t = 0)]
    pub entry_point: u64,

    /// External page-table base (Long mode only). Suppresses the built-in
    /// page-table builder when given.
    #[arg(short = 'p', long = "page-table-base", value_parser = parse_numeric)]
    pub page_table_base: Option<u64>,

    /// Path to the raw binary image.
    pub image: PathBuf,
}

impl Cli {
    pub fn mode(&self) -> VmMode {
        if self.long {
            VmMode::Long
        } else if self.protected {
            VmMode::Protected
        } else {
            VmMode::Real
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_parsing_accepts_decimal_hex_and_octal() {
        assert_eq!(parse_numeric("4096").unwrap(), 4096);
        assert_eq!(parse_numeric("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_numeric("0777").unwrap(), 0o777);
        assert_eq!(parse_numeric("0").unwrap(), 0);
    }

    #[test]
    fn default_mode_is_real() {
        let cli = Cli::parse_from(["blankvm", "image.bin"]);
        assert_eq!(cli.mode(), VmMode::Real);
        assert_eq!(cli.mem_bytes, DEFAULT_MEM_BYTES);
        assert_eq!(cli.entry_point, 0);
        assert_eq!(cli.page_table_base, None);
    }

    #[test]
    fn long_flag_selects_long_mode() {
        let cli = Cli::parse_from(["blankvm", "-L", "-m", "0x200000", "-e", "0", "image.bin"]);
        assert_eq!(cli.mode(), VmMode::Long);
        assert_eq!(cli.mem_bytes, 0x200000);
    }

    #[test]
    fn real_and_protected_flags_conflict() {
        let result = Cli::try_parse_from(["blankvm", "-R", "-P", "image.bin"]);
        assert!(result.is_err());
    }
}
