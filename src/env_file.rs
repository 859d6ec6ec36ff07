//! Command line flags and `.env` loading.
//!
//! Values already present in the process environment win over the file.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub env_file: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub validate_only: bool,
}

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    pub explicit: bool,
}

/// Parse flags (program name already skipped).
pub fn parse_args(args: impl IntoIterator<Item = OsString>) -> Result<CliArgs, String> {
    let mut out = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let arg = arg
            .into_string()
            .map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };

        match flag.as_str() {
            "--env-file" | "--config" => {
                let value = match inline {
                    Some(v) => v,
                    None => args
                        .next()
                        .and_then(|v| v.into_string().ok())
                        .ok_or_else(|| format!("`{}` requires a path argument", flag))?,
                };
                if value.is_empty() {
                    return Err(format!("`{}` requires a path argument", flag));
                }
                let slot = if flag == "--env-file" {
                    &mut out.env_file
                } else {
                    &mut out.config_path
                };
                if slot.is_some() {
                    return Err(format!("`{}` provided more than once", flag));
                }
                *slot = Some(PathBuf::from(value));
            }
            "--validate-only" if inline.is_none() => out.validate_only = true,
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }

    Ok(out)
}

/// Load the explicit env file, or `.env` from the working directory if present.
pub fn load(explicit: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        load_env_file(&path)?;
        return Ok(Some(LoadedEnvFile { path, explicit: true }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if !default_path.is_file() {
        return Ok(None);
    }
    load_env_file(&default_path)?;
    Ok(Some(LoadedEnvFile {
        path: default_path,
        explicit: false,
    }))
}

fn load_env_file(path: &Path) -> Result<(), String> {
    let file = File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read {} at line {}: {}", path.display(), index + 1, e))?;
        let Some((key, value)) =
            parse_assignment(&line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        else {
            continue;
        };
        if std::env::var_os(&key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }

    Ok(())
}

/// Parse one `.env` line; blank lines and comments yield `None`.
pub fn parse_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let body = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);
    let (key, raw) = body.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();

    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    let raw = raw.trim();
    let value = if let Some(rest) = raw.strip_prefix('"') {
        parse_quoted(rest, '"')?
    } else if let Some(rest) = raw.strip_prefix('\'') {
        parse_quoted(rest, '\'')?
    } else {
        raw.split('#').next().unwrap_or_default().trim_end().to_string()
    };
    Ok(Some((key.to_string(), value)))
}

/// Read up to the closing `quote`. Escapes are honoured in double quotes only.
fn parse_quoted(input: &str, quote: char) -> Result<String, String> {
    let kind = if quote == '"' { "double" } else { "single" };
    let mut result = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if quote == '"' && ch == '\\' {
            let escaped = chars
                .next()
                .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
            result.push(match escaped {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
        } else if ch == quote {
            let remainder = chars.as_str().trim();
            if remainder.is_empty() || remainder.starts_with('#') {
                return Ok(result);
            }
            return Err(format!("unexpected characters after closing {} quote", kind));
        } else {
            result.push(ch);
        }
    }

    Err(format!("unterminated {}-quoted value", kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<CliArgs, String> {
        parse_args(list.iter().map(OsString::from))
    }

    fn kv(k: &str, v: &str) -> Option<(String, String)> {
        Some((k.to_string(), v.to_string()))
    }

    #[test]
    fn flags() {
        let parsed = args(&["--env-file", "prod.env", "--config=house.json", "--validate-only"]).unwrap();
        assert_eq!(parsed.env_file, Some(PathBuf::from("prod.env")));
        assert_eq!(parsed.config_path, Some(PathBuf::from("house.json")));
        assert!(parsed.validate_only);

        assert_eq!(args(&["--", "--bogus"]).unwrap(), CliArgs::default());
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--config="]).is_err());
        assert!(args(&["--config", "a", "--config", "b"]).is_err());
        assert!(args(&["--validate-only=yes"]).is_err());
        assert!(args(&["house.json"]).is_err());
    }

    #[test]
    fn plain_and_exported_assignments() {
        assert_eq!(parse_assignment("HAIER_CONFIG=house.json").unwrap(), kv("HAIER_CONFIG", "house.json"));
        assert_eq!(parse_assignment("export RUST_LOG = debug # noisy").unwrap(), kv("RUST_LOG", "debug"));
        assert_eq!(parse_assignment("EMPTY=").unwrap(), kv("EMPTY", ""));
        assert_eq!(parse_assignment("   # comment").unwrap(), None);
        assert_eq!(parse_assignment("").unwrap(), None);
    }

    #[test]
    fn quoted_values() {
        assert_eq!(parse_assignment(r#"A="a # b\n""#).unwrap(), kv("A", "a # b\n"));
        assert_eq!(parse_assignment(r#"B='c\n' # x"#).unwrap(), kv("B", "c\\n"));
        assert_eq!(parse_assignment(r#"C="say \"hi\"""#).unwrap(), kv("C", "say \"hi\""));
        assert!(parse_assignment(r#"D="open"#).is_err());
        assert!(parse_assignment(r#"E='x' y"#).is_err());
        assert!(parse_assignment(r#"F="x\"#).is_err());
    }

    #[test]
    fn malformed_lines() {
        assert!(parse_assignment("NO_EQUALS").is_err());
        assert!(parse_assignment("=value").is_err());
        assert!(parse_assignment("BAD KEY=value").is_err());
    }
}
