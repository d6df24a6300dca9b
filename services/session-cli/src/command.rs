//! Command-line parsing
//!
//! Plain flag parsing over `std::env::args`: `--config <path>` anywhere, then a
//! subcommand and its arguments.

use std::fmt;

pub const USAGE: &str = "\
usage: tutor-session [--config <path>] <command>

commands:
  status                       restore the saved session and print it
  login <email>                log in (password from TUTOR_PASSWORD or stdin)
  signup <email> [options]     create an account (password as for login)
      --first-name <name>  --last-name <name>  --grade <level>
      --subjects <list>    --tenant <code>
  logout                       end the session and remove the saved credential
  get <path>                   authenticated GET, prints the JSON response
  documents                    list uploaded documents
  progress                     print the progress overview
  chat <message>               send one message to the tutor";

/// A parsed subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Login { email: String },
    Signup(SignupArgs),
    Logout,
    Get { path: String },
    Documents,
    Progress,
    Chat { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupArgs {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub grade_level: Option<String>,
    pub subjects: Option<String>,
    pub tenant_code: Option<String>,
}

/// Full invocation: optional config path plus the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config: Option<String>,
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq)]
pub struct UsageError(String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{USAGE}", self.0)
    }
}

impl std::error::Error for UsageError {}

fn usage(msg: impl Into<String>) -> UsageError {
    UsageError(msg.into())
}

impl Invocation {
    /// Parse arguments, excluding the program name.
    pub fn parse(args: &[String]) -> Result<Self, UsageError> {
        let mut config = None;
        let mut rest = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--config" {
                let path = iter.next().ok_or_else(|| usage("--config needs a path"))?;
                config = Some(path.clone());
            } else {
                rest.push(arg.as_str());
            }
        }

        let (name, params) = rest.split_first().ok_or_else(|| usage("missing command"))?;
        let command = match *name {
            "status" => Command::Status,
            "logout" => Command::Logout,
            "documents" => Command::Documents,
            "progress" => Command::Progress,
            "login" => Command::Login {
                email: single(params, "login needs an email")?,
            },
            "get" => {
                let path = single(params, "get needs a path")?;
                Command::Get {
                    path: if path.starts_with('/') {
                        path
                    } else {
                        format!("/{path}")
                    },
                }
            }
            "chat" => {
                if params.is_empty() {
                    return Err(usage("chat needs a message"));
                }
                Command::Chat {
                    message: params.join(" "),
                }
            }
            "signup" => Command::Signup(parse_signup(params)?),
            other => return Err(usage(format!("unknown command: {other}"))),
        };

        Ok(Self { config, command })
    }
}

fn single(params: &[&str], missing: &str) -> Result<String, UsageError> {
    match params {
        [value] => Ok((*value).to_string()),
        [] => Err(usage(missing)),
        _ => Err(usage(format!("unexpected arguments: {}", params[1..].join(" ")))),
    }
}

fn parse_signup(params: &[&str]) -> Result<SignupArgs, UsageError> {
    let (email, options) = params
        .split_first()
        .ok_or_else(|| usage("signup needs an email"))?;
    let mut args = SignupArgs {
        email: (*email).to_string(),
        ..SignupArgs::default()
    };

    let mut iter = options.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .map(|v| (*v).to_string())
            .ok_or_else(|| usage(format!("{flag} needs a value")))?;
        let slot = match *flag {
            "--first-name" => &mut args.first_name,
            "--last-name" => &mut args.last_name,
            "--grade" => &mut args.grade_level,
            "--subjects" => &mut args.subjects,
            "--tenant" => &mut args.tenant_code,
            other => return Err(usage(format!("unknown signup option: {other}"))),
        };
        *slot = Some(value);
    }
    Ok(args)
}
