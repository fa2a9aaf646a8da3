//! Chat command registry and argument parsing.
//!
//! Commands declare ordered arguments. Message-like arguments are
//! signable: a signed command packet must carry exactly one signature per
//! signable argument, keyed by argument name.

use rustc_hash::FxHashMap;

/// How an argument consumes input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// One whitespace-delimited word naming a player.
    Player,
    /// One whitespace-delimited word.
    Word,
    /// Everything that remains. Signable.
    GreedyMessage,
}

/// One declared argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentSpec {
    /// Argument name, used to match signatures.
    pub name: &'static str,
    /// Parsing rule.
    pub kind: ArgumentKind,
}

impl ArgumentSpec {
    /// Whether the argument's value is covered by a chat signature.
    pub fn is_signable(&self) -> bool {
        self.kind == ArgumentKind::GreedyMessage
    }
}

/// A registered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Command name without the slash.
    pub name: &'static str,
    /// Ordered arguments.
    pub arguments: Vec<ArgumentSpec>,
    /// One-line help text.
    pub description: &'static str,
}

/// A command line matched against its spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Command name.
    pub name: String,
    /// `(name, value, signable)` per declared argument, in order.
    pub arguments: Vec<(String, String, bool)>,
}

impl ParsedCommand {
    /// Value of the argument called `name`.
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, v, _)| v.as_str())
    }

    /// Signable arguments as `(name, value)`, in declaration order.
    pub fn signable_arguments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.arguments
            .iter()
            .filter(|(_, _, signable)| *signable)
            .map(|(n, v, _)| (n.as_str(), v.as_str()))
    }

    /// Whether any argument is signable.
    pub fn has_signable_arguments(&self) -> bool {
        self.signable_arguments().next().is_some()
    }
}

/// Why a command line did not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// No command with that name.
    #[error("unknown command: {0}")]
    Unknown(String),
    /// Required argument absent.
    #[error("missing argument <{0}>")]
    MissingArgument(&'static str),
    /// Input left over after the last argument.
    #[error("trailing input: {0}")]
    TrailingInput(String),
}

/// Built-in behavior of a parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Private message.
    Whisper {
        /// Recipient name.
        target: String,
        /// Message text.
        message: String,
    },
    /// Broadcast announcement.
    Say {
        /// Message text.
        message: String,
    },
    /// Emote.
    Emote {
        /// Action text.
        action: String,
    },
    /// List commands.
    Help,
}

/// Registered commands by name.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: FxHashMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    /// Registry with `msg`, `say`, `me` and `help`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(CommandSpec {
            name: "msg",
            arguments: vec![
                ArgumentSpec {
                    name: "targets",
                    kind: ArgumentKind::Player,
                },
                ArgumentSpec {
                    name: "message",
                    kind: ArgumentKind::GreedyMessage,
                },
            ],
            description: "Send a private message",
        });
        registry.register(CommandSpec {
            name: "say",
            arguments: vec![ArgumentSpec {
                name: "message",
                kind: ArgumentKind::GreedyMessage,
            }],
            description: "Broadcast a message",
        });
        registry.register(CommandSpec {
            name: "me",
            arguments: vec![ArgumentSpec {
                name: "action",
                kind: ArgumentKind::GreedyMessage,
            }],
            description: "Describe an action",
        });
        registry.register(CommandSpec {
            name: "help",
            arguments: Vec::new(),
            description: "List commands",
        });
        registry
    }

    /// Add or replace a command.
    pub fn register(&mut self, spec: CommandSpec) {
        self.commands.insert(spec.name, spec);
    }

    /// Look up a command.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    /// Commands sorted by name.
    pub fn list(&self) -> Vec<&CommandSpec> {
        let mut specs: Vec<&CommandSpec> = self.commands.values().collect();
        specs.sort_by_key(|s| s.name);
        specs
    }

    /// Parse a command line (without the leading slash).
    pub fn parse(&self, input: &str) -> Result<ParsedCommand, CommandError> {
        let input = input.trim_start();
        let (name, mut rest) = input.split_once(' ').unwrap_or((input, ""));
        let spec = self
            .get(name)
            .ok_or_else(|| CommandError::Unknown(name.to_string()))?;

        let mut arguments = Vec::with_capacity(spec.arguments.len());
        for argument in &spec.arguments {
            rest = rest.trim_start();
            let value = match argument.kind {
                ArgumentKind::GreedyMessage => std::mem::take(&mut rest),
                ArgumentKind::Player | ArgumentKind::Word => {
                    let (word, tail) = rest.split_once(' ').unwrap_or((rest, ""));
                    rest = tail;
                    word
                }
            };
            if value.is_empty() {
                return Err(CommandError::MissingArgument(argument.name));
            }
            arguments.push((
                argument.name.to_string(),
                value.to_string(),
                argument.is_signable(),
            ));
        }
        if !rest.trim().is_empty() {
            return Err(CommandError::TrailingInput(rest.trim().to_string()));
        }

        Ok(ParsedCommand {
            name: name.to_string(),
            arguments,
        })
    }

    /// Built-in action for a parsed command, `None` for commands the world handles.
    pub fn action(&self, parsed: &ParsedCommand) -> Option<CommandAction> {
        let arg = |name: &str| parsed.argument(name).unwrap_or_default().to_string();
        match parsed.name.as_str() {
            "msg" => Some(CommandAction::Whisper {
                target: arg("targets"),
                message: arg("message"),
            }),
            "say" => Some(CommandAction::Say {
                message: arg("message"),
            }),
            "me" => Some(CommandAction::Emote {
                action: arg("action"),
            }),
            "help" => Some(CommandAction::Help),
            _ => None,
        }
    }
}
