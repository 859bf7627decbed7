// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Launcher script rendering.
//!
//! The launcher is a small POSIX shell wrapper: it enters the application
//! root, applies the worker environment and execs the entry command with a
//! `--port <N>` flag. The entry command is expected to daemonize (Unicorn's
//! `-D`) so that running the launcher returns as soon as the worker forked.
//!
//! The port is recovered later by matching the flag in the script text, so
//! the rendered layout is a compatibility surface.

use log::debug;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::config::SupervisorConfig;
use crate::errors::{Error, Result};
use crate::mode::RuntimeMode;

pub const LAUNCHER_NAME: &str = "launch.sh";

/// Variable carrying the runtime mode. The script only sets it when the
/// caller's environment does not.
pub const MODE_ENV_VAR: &str = "RAILS_ENV";

#[allow(clippy::unwrap_used)]
static PORT_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(?:-p|--port)(?:\s+|=)?(\d+)\b").unwrap());

/// The parts of the launcher that are deployment constants rather than
/// per-call inputs.
#[derive(Debug, Clone, Copy)]
pub struct ScriptTemplate<'a> {
    pub env: &'a BTreeMap<String, String>,
    pub entry_command: &'a str,
}

impl<'a> ScriptTemplate<'a> {
    pub fn from_config(config: &'a SupervisorConfig) -> Self {
        Self {
            env: &config.env,
            entry_command: &config.entry_command,
        }
    }
}

/// Render the launcher script for `app_root` bound to `port`.
pub fn render(
    app_root: &Path,
    port: u16,
    mode: RuntimeMode,
    template: &ScriptTemplate<'_>,
) -> Result<String> {
    if app_root.as_os_str().is_empty() {
        return Err(Error::EmptyAppRoot);
    }
    if port == 0 {
        return Err(Error::InvalidPort(port));
    }

    let mut assignments = Vec::with_capacity(template.env.len() + 1);
    for (name, value) in template.env {
        if !is_shell_identifier(name) {
            return Err(Error::InvalidEnvName(name.clone()));
        }
        if name == MODE_ENV_VAR {
            debug!("ignoring {MODE_ENV_VAR} from env, runtime mode is {mode}");
            continue;
        }
        assignments.push(format!("{name}={}", double_quote(value)));
    }
    assignments.push(format!("{MODE_ENV_VAR}=${{{MODE_ENV_VAR}:-{mode}}}"));
    assignments.push(format!("{} --port {port}", template.entry_command.trim()));

    let mut script = String::from("#!/bin/sh\n\n");
    script.push_str("cd ");
    script.push_str(&shell_quote(&app_root.to_string_lossy()));
    script.push_str(" && env ");
    script.push_str(&assignments.join(" \\\n\t"));
    script.push('\n');
    Ok(script)
}

/// Extract the port from launcher text. The last `-p`/`--port` flag wins.
pub fn parse_port(script: &str) -> Option<u16> {
    let caps = PORT_FLAG.captures_iter(script).last()?;
    let port: u16 = caps.get(1)?.as_str().parse().ok()?;
    (port != 0).then_some(port)
}

/// Wrap `value` in double quotes. `$` is left alone so values may still
/// reference shell variables.
fn double_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Wrap `value` in single quotes for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn is_shell_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_ENTRY_COMMAND, default_env};

    fn render_default(app_root: &str, port: u16, mode: RuntimeMode) -> Result<String> {
        let env = default_env();
        let template = ScriptTemplate {
            env: &env,
            entry_command: DEFAULT_ENTRY_COMMAND,
        };
        render(Path::new(app_root), port, mode, &template)
    }

    #[test]
    fn test_render_default_layout() {
        let script = render_default("/home/forum/discourse", 9292, RuntimeMode::Production).unwrap();
        let expected = "#!/bin/sh\n\n\
cd '/home/forum/discourse' && env LD_PRELOAD=\"/usr/lib64/libjemalloc.so.1\" \\\n\
\tRUBY_GLOBAL_METHOD_CACHE_SIZE=\"131072\" \\\n\
\tUNICORN_SIDEKIQS=\"1\" \\\n\
\tRAILS_ENV=${RAILS_ENV:-production} \\\n\
\trbenv exec ruby ./bin/unicorn -c config/unicorn.conf.rb -D --port 9292\n";
        assert_eq!(script, expected);
    }

    #[test]
    fn test_render_mode() {
        let script = render_default("/srv/forum", 3000, RuntimeMode::Development).unwrap();
        assert!(script.contains("RAILS_ENV=${RAILS_ENV:-development}"));
    }

    #[test]
    fn test_render_then_parse_port() {
        for port in [1, 80, 9292, 40123, 65535] {
            let script = render_default("/srv/forum", port, RuntimeMode::Production).unwrap();
            assert_eq!(parse_port(&script), Some(port), "port {port}");
        }
    }

    #[test]
    fn test_render_rejects_empty_root() {
        let err = render_default("", 9292, RuntimeMode::Production).unwrap_err();
        assert!(matches!(err, Error::EmptyAppRoot));
    }

    #[test]
    fn test_render_rejects_port_zero() {
        let err = render_default("/srv/forum", 0, RuntimeMode::Production).unwrap_err();
        assert!(matches!(err, Error::InvalidPort(0)));
    }

    #[test]
    fn test_render_rejects_bad_env_name() {
        let env = BTreeMap::from([("BAD NAME".to_string(), "1".to_string())]);
        let template = ScriptTemplate {
            env: &env,
            entry_command: "./worker",
        };
        let err = render(Path::new("/srv"), 80, RuntimeMode::Production, &template).unwrap_err();
        assert!(matches!(err, Error::InvalidEnvName(ref n) if n == "BAD NAME"));
    }

    #[test]
    fn test_render_mode_env_not_duplicated() {
        let env = BTreeMap::from([("RAILS_ENV".to_string(), "test".to_string())]);
        let template = ScriptTemplate {
            env: &env,
            entry_command: "./worker",
        };
        let script = render(Path::new("/srv"), 80, RuntimeMode::Staging, &template).unwrap();
        assert_eq!(script.matches("RAILS_ENV=").count(), 1);
        assert!(script.contains("RAILS_ENV=${RAILS_ENV:-staging}"));
    }

    #[test]
    fn test_render_quotes_app_root() {
        let script = render_default("/srv/it's here", 80, RuntimeMode::Production).unwrap();
        assert!(script.contains(r"cd '/srv/it'\''s here' && env"));
    }

    #[test]
    fn test_parse_port_variants() {
        assert_eq!(parse_port("./bin/unicorn -D -p 9292"), Some(9292));
        assert_eq!(parse_port("./bin/unicorn --port 8080\n"), Some(8080));
        assert_eq!(parse_port("./bin/unicorn --port=8081"), Some(8081));
        assert_eq!(parse_port("\t--port 7000 \\\n"), Some(7000));
    }

    #[test]
    fn test_parse_port_attached_value() {
        assert_eq!(parse_port("./bin/unicorn -D -p9292"), Some(9292));
        assert_eq!(parse_port("./bin/unicorn --port9292\n"), Some(9292));
        assert_eq!(parse_port("./bin/unicorn -pid 9292"), None);
    }

    #[test]
    fn test_parse_port_missing_or_invalid() {
        assert_eq!(parse_port("#!/bin/sh\nexec ./bin/unicorn -D\n"), None);
        assert_eq!(parse_port("./bin/unicorn --port 99999"), None);
        assert_eq!(parse_port("./bin/unicorn --port 0"), None);
        assert_eq!(parse_port("./bin/unicorn --port abc"), None);
    }

    #[test]
    fn test_parse_port_ignores_flag_lookalikes_in_paths() {
        let script = render_default("/srv/app-p8", 9292, RuntimeMode::Production).unwrap();
        assert_eq!(parse_port(&script), Some(9292));
        assert_eq!(parse_port("cd /srv/app-p8 && ./bin/unicorn"), None);
    }

    #[test]
    fn test_double_quote() {
        assert_eq!(double_quote("plain"), r#""plain""#);
        assert_eq!(double_quote("$HOME/x"), r#""$HOME/x""#);
        assert_eq!(double_quote(r#"a"b\c`d"#), r#""a\"b\\c\`d""#);
    }

    /// Renders env values holding spaces and shell metacharacters and runs the
    /// script, checking the worker sees them intact.
    #[test]
    fn test_rendered_env_values_survive_the_shell() {
        let dir = tempfile::tempdir().unwrap();
        let env = BTreeMap::from([
            (
                "MALLOC_CONF".to_string(),
                "narenas:2 background_thread:true".to_string(),
            ),
            ("FORUM_QUOTE".to_string(), r#"say "hi" `no` \o/; true"#.to_string()),
            ("FORUM_HOME".to_string(), "$HOME/forum".to_string()),
        ]);
        let template = ScriptTemplate {
            env: &env,
            entry_command: r#"sh -c 'printf "%s|%s|%s" "$MALLOC_CONF" "$FORUM_QUOTE" "$FORUM_HOME"'"#,
        };
        let text = render(dir.path(), 9292, RuntimeMode::Production, &template).unwrap();
        let script = dir.path().join(LAUNCHER_NAME);
        std::fs::write(&script, text).unwrap();

        let out = std::process::Command::new("/bin/sh")
            .arg(&script)
            .env("HOME", "/home/forum")
            .output()
            .unwrap();
        assert!(out.status.success(), "launcher failed: {out:?}");
        assert_eq!(
            String::from_utf8_lossy(&out.stdout),
            r#"narenas:2 background_thread:true|say "hi" `no` \o/; true|/home/forum/forum"#
        );
    }

    #[test]
    fn test_shell_identifier() {
        assert!(is_shell_identifier("LD_PRELOAD"));
        assert!(is_shell_identifier("_X1"));
        assert!(!is_shell_identifier("1X"));
        assert!(!is_shell_identifier(""));
        assert!(!is_shell_identifier("A-B"));
    }
}
