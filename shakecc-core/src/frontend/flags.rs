//! Compiler-style front-end flags.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{ShakeError, ShakeResult};

/// `__cplusplus` used when no `-std=` is given.
pub const DEFAULT_CPLUSPLUS: i64 = 201703;

fn std_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^-std=(?:c|gnu)\+\+([0-9a-z]+)$").unwrap_or_else(|e| unreachable!("{e}"))
    })
}

/// Flags understood by the reference front end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontEndFlags {
    /// `-D NAME[=VALUE]`, in command-line order
    pub defines: Vec<(String, String)>,
    /// `-U NAME`
    pub undefines: Vec<String>,
    /// Value of `__cplusplus` selected by `-std=`
    pub cplusplus: Option<i64>,
    pub include_dirs: Vec<PathBuf>,
    pub system_include_dirs: Vec<PathBuf>,
    pub delayed_template_parsing: bool,
    /// Flags accepted but without effect on this front end
    pub ignored: Vec<String>,
}

impl FrontEndFlags {
    pub fn parse<S: AsRef<str>>(args: &[S]) -> ShakeResult<Self> {
        let mut flags = Self::default();
        let mut iter = args.iter().map(|s| AsRef::<str>::as_ref(s));

        while let Some(arg) = iter.next() {
            if let Some(rest) = arg.strip_prefix("-D") {
                let value = Self::joined_or_next(rest, "-D", &mut iter)?;
                flags.defines.push(split_define(value));
            } else if let Some(rest) = arg.strip_prefix("-U") {
                let value = Self::joined_or_next(rest, "-U", &mut iter)?;
                flags.undefines.push(value.to_string());
            } else if let Some(rest) = arg.strip_prefix("-isystem") {
                let value = Self::joined_or_next(rest, "-isystem", &mut iter)?;
                flags.system_include_dirs.push(PathBuf::from(value));
            } else if let Some(rest) = arg.strip_prefix("-I") {
                let value = Self::joined_or_next(rest, "-I", &mut iter)?;
                flags.include_dirs.push(PathBuf::from(value));
            } else if arg.starts_with("-std=") {
                flags.cplusplus = Some(cplusplus_for(arg)?);
            } else if arg == "-fdelayed-template-parsing" {
                flags.delayed_template_parsing = true;
            } else if arg == "-fno-delayed-template-parsing" {
                flags.delayed_template_parsing = false;
            } else if is_harmless(arg) {
                debug!(flag = arg, "flag has no effect on the front end");
                flags.ignored.push(arg.to_string());
            } else {
                warn!(flag = arg, "unknown front-end flag ignored");
                flags.ignored.push(arg.to_string());
            }
        }
        Ok(flags)
    }

    fn joined_or_next<'a>(
        joined: &'a str,
        flag: &str,
        rest: &mut impl Iterator<Item = &'a str>,
    ) -> ShakeResult<&'a str> {
        if !joined.is_empty() {
            return Ok(joined);
        }
        rest.next()
            .ok_or_else(|| ShakeError::invalid_argument(format!("missing argument after {flag}")))
    }

    pub fn cplusplus_value(&self) -> i64 {
        self.cplusplus.unwrap_or(DEFAULT_CPLUSPLUS)
    }
}

fn split_define(value: &str) -> (String, String) {
    match value.split_once('=') {
        Some((name, body)) => (name.to_string(), body.to_string()),
        None => (value.to_string(), "1".to_string()),
    }
}

fn cplusplus_for(arg: &str) -> ShakeResult<i64> {
    let caps = std_regex()
        .captures(arg)
        .ok_or_else(|| ShakeError::invalid_argument(format!("unsupported language standard: {arg}")))?;
    let version = match &caps[1] {
        "98" | "03" => 199711,
        "11" | "0x" => 201103,
        "14" | "1y" => 201402,
        "17" | "1z" => 201703,
        "20" | "2a" => 202002,
        "23" | "2b" => 202302,
        "26" | "2c" => 202400,
        other => {
            return Err(ShakeError::invalid_argument(format!(
                "unsupported language standard: c++{other}"
            )))
        }
    };
    Ok(version)
}

fn is_harmless(arg: &str) -> bool {
    arg.starts_with("-W")
        || arg.starts_with("-O")
        || arg.starts_with("-f")
        || arg.starts_with("-m")
        || arg.starts_with("-g")
        || arg == "-c"
        || arg == "-x"
        || arg == "c++"
        || arg == "-pedantic"
}
