//! Color decision for log output on stderr.

use std::io::IsTerminal;

fn env_set(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|v| !v.is_empty())
}

/// The environment's say in whether log output is colored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ColorEnv {
    force: bool,
    disable: bool,
    dumb_terminal: bool,
}

impl ColorEnv {
    fn from_process() -> Self {
        Self {
            force: env_set("FORCE_COLOR"),
            disable: env_set("NO_COLOR"),
            dumb_terminal: std::env::var_os("TERM").is_some_and(|t| t == "dumb"),
        }
    }

    /// `FORCE_COLOR` wins; otherwise color needs a terminal that is not `TERM=dumb` and no
    /// `NO_COLOR`.
    fn allows(self, is_terminal: bool) -> bool {
        self.force || (is_terminal && !self.disable && !self.dumb_terminal)
    }
}

/// Whether log lines written to `stream` should carry ANSI colors.
pub fn should_use_color<T: IsTerminal>(stream: &T) -> bool {
    ColorEnv::from_process().allows(stream.is_terminal())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminals_get_color_by_default() {
        assert!(ColorEnv::default().allows(true));
        assert!(!ColorEnv::default().allows(false));
    }

    #[test]
    fn no_color_and_dumb_terminals_disable_it() {
        let no_color = ColorEnv {
            disable: true,
            ..ColorEnv::default()
        };
        let dumb = ColorEnv {
            dumb_terminal: true,
            ..ColorEnv::default()
        };
        assert!(!no_color.allows(true));
        assert!(!dumb.allows(true));
    }

    #[test]
    fn force_color_wins_even_when_piped() {
        let forced = ColorEnv {
            force: true,
            disable: true,
            dumb_terminal: true,
        };
        assert!(forced.allows(false));
    }
}
