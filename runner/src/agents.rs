//! Static per-agent profiles: how to invoke each CLI and where its answer
//! and token counts live in the output.
//!
//! ## Invocation summary
//!
//! | Agent  | Base arguments                                  | json                      | text                      | jsonl-events                              |
//! |--------|-------------------------------------------------|---------------------------|---------------------------|-------------------------------------------|
//! | claude | `--print`                                       | `--output-format json`    | `--output-format text`    | `--output-format stream-json --verbose`   |
//! | codex  | `exec --skip-git-repo-check --full-auto`        | unsupported               | (none)                    | `--json`                                  |
//! | gemini | (none)                                          | `--output-format json`    | `--output-format text`    | `--output-format stream-json`             |
//!
//! The prompt is always the last argument.

use crate::parse::OutputStyle;
use crate::types::{AgentKind, OutputMode, RunConfiguration};
use std::ffi::OsString;

/// Whether an event rule keeps the newest match or joins all matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collect {
    /// Newest matching event wins.
    Last,
    /// Matching texts are concatenated in emission order.
    Concat,
}

/// Extracts response text from an event stream.
#[derive(Debug, Clone, Copy)]
pub struct EventRule {
    /// Required value of the event's `type` field.
    pub event_type: &'static str,
    /// Additional `(pointer, expected string)` constraints.
    pub when: &'static [(&'static str, &'static str)],
    /// JSON pointer to the text inside a matching event.
    pub text: &'static str,
    /// How multiple matches combine.
    pub collect: Collect,
}

/// Where an agent puts its primary answer.
#[derive(Debug, Clone, Copy)]
pub struct ResponseRules {
    /// Pointers tried in order against a single JSON document.
    pub document: &'static [&'static str],
    /// Rules tried in order against an event stream.
    pub events: &'static [EventRule],
}

/// Pointer candidates for each usage counter.
///
/// A `*` path segment sums the counter over every child of that node.
#[derive(Debug, Clone, Copy)]
pub struct UsagePointers {
    /// Input token candidates.
    pub input: &'static [&'static str],
    /// Output token candidates.
    pub output: &'static [&'static str],
    /// Cached input token candidates.
    pub cached: &'static [&'static str],
}

/// Where an agent reports token usage.
#[derive(Debug, Clone, Copy)]
pub struct UsageRules {
    /// Pointers into a single JSON document.
    pub document: UsagePointers,
    /// Pointers into one event; the newest event carrying any count wins.
    pub events: UsagePointers,
}

/// Optional CLI feature detected from `--help` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    /// `--output-format` flag.
    OutputFormat,
    /// `stream-json` output.
    StreamJson,
    /// `--json` event output.
    JsonEvents,
    /// `--full-auto` approval mode.
    FullAuto,
    /// `--skip-git-repo-check` flag.
    SkipGitRepoCheck,
    /// `--model` flag.
    Model,
}

/// Everything the runner needs to know about one agent.
#[derive(Debug)]
pub struct AgentProfile {
    /// Agent identifier.
    pub kind: AgentKind,
    /// Executable name looked up on `$PATH`.
    pub binary: &'static str,
    /// Environment variable that overrides the executable path.
    pub bin_env_var: &'static str,
    /// Install instructions shown when the executable is missing.
    pub install_hint: &'static str,
    /// Arguments that precede everything else.
    pub base_args: &'static [&'static str],
    /// Flags per supported output mode.
    pub mode_flags: &'static [(OutputMode, &'static [&'static str])],
    /// Mode used when none (or an unsupported one) is requested.
    pub default_mode: OutputMode,
    /// Response extraction conventions.
    pub response: ResponseRules,
    /// Usage extraction conventions.
    pub usage: UsageRules,
    /// `--help` substrings that reveal optional features.
    pub capability_markers: &'static [(Feature, &'static str)],
    /// Credential variables the CLI may read (reported, never inspected).
    pub credential_env: &'static [&'static str],
}

const NO_USAGE: UsagePointers = UsagePointers {
    input: &[],
    output: &[],
    cached: &[],
};

static CLAUDE: AgentProfile = AgentProfile {
    kind: AgentKind::Claude,
    binary: "claude",
    bin_env_var: "AGENT_MESH_CLAUDE_BIN",
    install_hint: "npm install -g @anthropic-ai/claude-code",
    base_args: &["--print"],
    mode_flags: &[
        (OutputMode::Json, &["--output-format", "json"]),
        (OutputMode::Text, &["--output-format", "text"]),
        (OutputMode::JsonlEvents, &["--output-format", "stream-json", "--verbose"]),
    ],
    default_mode: OutputMode::Json,
    response: ResponseRules {
        document: &["/result", "/output", "/response", "/text"],
        events: &[
            EventRule {
                event_type: "result",
                when: &[],
                text: "/result",
                collect: Collect::Last,
            },
            EventRule {
                event_type: "assistant",
                when: &[("/message/content/0/type", "text")],
                text: "/message/content/0/text",
                collect: Collect::Concat,
            },
        ],
    },
    usage: UsageRules {
        document: UsagePointers {
            input: &["/usage/input_tokens"],
            output: &["/usage/output_tokens"],
            cached: &["/usage/cache_read_input_tokens"],
        },
        events: UsagePointers {
            input: &["/usage/input_tokens"],
            output: &["/usage/output_tokens"],
            cached: &["/usage/cache_read_input_tokens"],
        },
    },
    capability_markers: &[
        (Feature::OutputFormat, "--output-format"),
        (Feature::StreamJson, "stream-json"),
        (Feature::Model, "--model"),
    ],
    credential_env: &["ANTHROPIC_API_KEY", "CLAUDE_CODE_USE_BEDROCK"],
};

static CODEX: AgentProfile = AgentProfile {
    kind: AgentKind::Codex,
    binary: "codex",
    bin_env_var: "AGENT_MESH_CODEX_BIN",
    install_hint: "npm install -g @openai/codex",
    base_args: &["exec", "--skip-git-repo-check", "--full-auto"],
    mode_flags: &[
        (OutputMode::JsonlEvents, &["--json"]),
        (OutputMode::Text, &[]),
    ],
    default_mode: OutputMode::JsonlEvents,
    response: ResponseRules {
        document: &["/message", "/text"],
        events: &[
            EventRule {
                event_type: "item.completed",
                when: &[("/item/type", "agent_message")],
                text: "/item/text",
                collect: Collect::Last,
            },
            EventRule {
                event_type: "message",
                when: &[],
                text: "/message",
                collect: Collect::Last,
            },
        ],
    },
    usage: UsageRules {
        document: NO_USAGE,
        events: UsagePointers {
            input: &["/usage/input_tokens"],
            output: &["/usage/output_tokens"],
            cached: &["/usage/cached_input_tokens"],
        },
    },
    capability_markers: &[
        (Feature::JsonEvents, "--json"),
        (Feature::FullAuto, "--full-auto"),
        (Feature::SkipGitRepoCheck, "--skip-git-repo-check"),
        (Feature::Model, "--model"),
    ],
    credential_env: &["OPENAI_API_KEY"],
};

static GEMINI: AgentProfile = AgentProfile {
    kind: AgentKind::Gemini,
    binary: "gemini",
    bin_env_var: "AGENT_MESH_GEMINI_BIN",
    install_hint: "npm install -g @google/gemini-cli",
    base_args: &[],
    mode_flags: &[
        (OutputMode::Json, &["--output-format", "json"]),
        (OutputMode::Text, &["--output-format", "text"]),
        (OutputMode::JsonlEvents, &["--output-format", "stream-json"]),
    ],
    default_mode: OutputMode::Json,
    response: ResponseRules {
        document: &["/response", "/text", "/candidates/0/content/parts/0/text"],
        events: &[EventRule {
            event_type: "message",
            when: &[("/role", "assistant")],
            text: "/content",
            collect: Collect::Concat,
        }],
    },
    usage: UsageRules {
        document: UsagePointers {
            input: &["/stats/inputTokens", "/stats/models/*/tokens/prompt"],
            output: &["/stats/outputTokens", "/stats/models/*/tokens/candidates"],
            cached: &["/stats/models/*/tokens/cached"],
        },
        events: UsagePointers {
            input: &["/stats/input_tokens"],
            output: &["/stats/output_tokens"],
            cached: &["/stats/cached"],
        },
    },
    capability_markers: &[
        (Feature::OutputFormat, "--output-format"),
        (Feature::StreamJson, "stream-json"),
        (Feature::Model, "--model"),
    ],
    credential_env: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
};

/// Looks up the static profile for an agent.
#[must_use]
pub fn profile(kind: AgentKind) -> &'static AgentProfile {
    match kind {
        AgentKind::Claude => &CLAUDE,
        AgentKind::Codex => &CODEX,
        AgentKind::Gemini => &GEMINI,
    }
}

impl AgentProfile {
    /// Modes this agent accepts.
    pub fn supported_modes(&self) -> impl Iterator<Item = OutputMode> + '_ {
        self.mode_flags.iter().map(|(mode, _)| *mode)
    }

    /// Returns the requested mode if supported, otherwise the default.
    #[must_use]
    pub fn resolve_mode(&self, requested: Option<OutputMode>) -> OutputMode {
        match requested {
            Some(mode) if self.supported_modes().any(|m| m == mode) => mode,
            Some(mode) => {
                tracing::warn!(
                    agent = %self.kind,
                    requested = %mode,
                    fallback = %self.default_mode,
                    "Output mode not supported by agent, using default"
                );
                self.default_mode
            }
            None => self.default_mode,
        }
    }

    /// Parser matching an output mode.
    #[must_use]
    pub const fn style_for(mode: OutputMode) -> OutputStyle {
        match mode {
            OutputMode::Json => OutputStyle::SingleJson,
            OutputMode::JsonlEvents => OutputStyle::JsonLines,
            OutputMode::Text => OutputStyle::PlainText,
        }
    }

    /// Builds the argument vector (without the program) for a run.
    #[must_use]
    pub fn build_args(&self, mode: OutputMode, config: &RunConfiguration) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.base_args.iter().map(OsString::from).collect();

        if let Some((_, flags)) = self.mode_flags.iter().find(|(m, _)| *m == mode) {
            args.extend(flags.iter().map(OsString::from));
        }

        args.extend(config.extra_arguments().iter().map(OsString::from));
        args.push(OsString::from(config.prompt()));

        args
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn args_for(kind: AgentKind, mode: Option<OutputMode>) -> Vec<String> {
        let mut builder = RunConfiguration::builder("test prompt");
        if let Some(mode) = mode {
            builder = builder.output_mode(mode);
        }
        let config = builder.build().unwrap();
        let profile = profile(kind);
        let mode = profile.resolve_mode(config.output_mode());
        profile
            .build_args(mode, &config)
            .into_iter()
            .map(|s| s.into_string().unwrap())
            .collect()
    }

    #[test]
    fn test_claude_default_requests_json() {
        assert_eq!(
            args_for(AgentKind::Claude, None),
            ["--print", "--output-format", "json", "test prompt"]
        );
    }

    #[test]
    fn test_claude_stream_json_needs_verbose() {
        let args = args_for(AgentKind::Claude, Some(OutputMode::JsonlEvents));
        assert!(
            args.windows(2).any(|w| w[0] == "--output-format" && w[1] == "stream-json"),
            "Expected '--output-format stream-json' but got: {args:?}"
        );
        assert!(args.contains(&"--verbose".to_string()));
    }

    #[test]
    fn test_codex_default_emits_json_events() {
        assert_eq!(
            args_for(AgentKind::Codex, None),
            ["exec", "--skip-git-repo-check", "--full-auto", "--json", "test prompt"]
        );
    }

    #[test]
    fn test_codex_text_mode_drops_json_flag() {
        let args = args_for(AgentKind::Codex, Some(OutputMode::Text));
        assert!(!args.contains(&"--json".to_string()), "unexpected --json in {args:?}");
    }

    #[test]
    fn test_codex_unsupported_json_falls_back_to_default() {
        let codex = profile(AgentKind::Codex);
        assert_eq!(codex.resolve_mode(Some(OutputMode::Json)), OutputMode::JsonlEvents);
    }

    #[test]
    fn test_gemini_prompt_is_last() {
        let args = args_for(AgentKind::Gemini, Some(OutputMode::Text));
        assert_eq!(args, ["--output-format", "text", "test prompt"]);
    }

    #[test]
    fn test_extra_arguments_precede_prompt() {
        let config = RunConfiguration::builder("do it")
            .extra_arguments(["--model", "o4-mini"])
            .build()
            .unwrap();
        let codex = profile(AgentKind::Codex);
        let args: Vec<String> = codex
            .build_args(OutputMode::JsonlEvents, &config)
            .into_iter()
            .map(|s| s.into_string().unwrap())
            .collect();
        assert_eq!(&args[args.len() - 3..], ["--model", "o4-mini", "do it"]);
    }

    #[test]
    fn test_every_default_mode_is_supported() {
        for kind in AgentKind::ALL {
            let p = profile(kind);
            assert_eq!(p.kind, kind);
            assert!(p.supported_modes().any(|m| m == p.default_mode));
        }
    }
}
