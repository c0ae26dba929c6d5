//! Argument parsing and command execution

use client::{HttpClient, Method, RequestDescriptor};

use crate::error::{Error, Result};

/// Parsed command line.
#[derive(Debug, PartialEq)]
pub struct Cli {
    pub config_path: Option<String>,
    pub metrics: bool,
    pub command: Command,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Login {
        email: String,
        password: String,
    },
    Request {
        method: Method,
        path: String,
        body: Option<serde_json::Value>,
    },
    Whoami,
    Logout,
}

impl Cli {
    /// Parse arguments (without the program name).
    ///
    /// Flags may appear anywhere: `--config <path>` and `--metrics`.
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut config_path = None;
        let mut metrics = false;
        let mut positional = Vec::new();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => {
                    let path = iter.next().ok_or(Error::MissingFlagValue("--config"))?;
                    config_path = Some(path.clone());
                }
                "--metrics" => metrics = true,
                _ => positional.push(arg.as_str()),
            }
        }

        Ok(Self {
            config_path,
            metrics,
            command: Command::parse(&positional)?,
        })
    }
}

impl Command {
    fn parse(args: &[&str]) -> Result<Self> {
        let (name, rest) = args.split_first().ok_or(Error::MissingCommand)?;
        match *name {
            "login" => Ok(Self::Login {
                email: arg(rest, 0, "email")?,
                password: arg(rest, 1, "password")?,
            }),
            "request" => {
                let raw_method = arg(rest, 0, "method")?;
                let method = Method::from_bytes(raw_method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| Error::InvalidMethod(raw_method.clone()))?;
                let path = arg(rest, 1, "path")?;
                let body = rest
                    .get(2)
                    .map(|raw| serde_json::from_str(raw))
                    .transpose()
                    .map_err(|e| Error::InvalidBody(e.to_string()))?;
                Ok(Self::Request { method, path, body })
            }
            "whoami" => Ok(Self::Whoami),
            "logout" => Ok(Self::Logout),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

fn arg(rest: &[&str], index: usize, name: &'static str) -> Result<String> {
    rest.get(index)
        .map(|s| (*s).to_string())
        .ok_or(Error::MissingArgument(name))
}

/// Run one command and return what should be printed on success.
pub async fn run(client: &HttpClient, command: Command) -> client::Result<String> {
    match command {
        Command::Login { email, password } => {
            let login = client.login(&email, &password).await?;
            let name = login
                .user_info
                .as_ref()
                .and_then(|info| info.get("nickname").or_else(|| info.get("email")))
                .and_then(|v| v.as_str())
                .unwrap_or(email.as_str())
                .to_string();
            Ok(format!("signed in as {name}"))
        }
        Command::Request { method, path, body } => {
            let mut request = RequestDescriptor::new(method, path);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = client.send(request).await?;
            Ok(response.text())
        }
        Command::Whoami => {
            let profile = client.fetch_profile().await?;
            Ok(serde_json::to_string_pretty(&profile).unwrap_or_else(|_| profile.to_string()))
        }
        Command::Logout => {
            client.logout().await?;
            Ok("signed out".to_string())
        }
    }
}
