//! Command parsing and execution.

use std::io::{self, Write};

use anyhow::{anyhow, bail, Result};
use tracing::debug;

use taskmate_core::{DeepLink, ProviderResponse, ResumeAction, SessionManager};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: Option<String> },
    Register { name: String, email: String },
    ForgotPassword { email: String },
    ResetPassword { token: String },
    Resume { link: String },
    WebReset { reset_id: String },
    WhoAmI,
    Refresh,
    Logout,
}

impl Command {
    /// Parse the arguments after the program name
    pub fn parse(args: &[String]) -> Option<Self> {
        let arg = |i: usize| args.get(i).cloned();
        let command = match args.first()?.as_str() {
            "login" => Command::Login { email: arg(1) },
            "register" => Command::Register {
                name: arg(1)?,
                email: arg(2)?,
            },
            "forgot-password" => Command::ForgotPassword { email: arg(1)? },
            "reset-password" => Command::ResetPassword { token: arg(1)? },
            "resume" => Command::Resume { link: arg(1)? },
            "web-reset" => Command::WebReset { reset_id: arg(1)? },
            "whoami" => Command::WhoAmI,
            "refresh" => Command::Refresh,
            "logout" => Command::Logout,
            _ => return None,
        };
        Some(command)
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_email(default: Option<&str>) -> Result<String> {
    let email = match default {
        Some(last) => {
            let input = prompt(&format!("Email [{last}]"))?;
            if input.is_empty() {
                last.to_string()
            } else {
                input
            }
        }
        None => prompt("Email")?,
    };
    if email.is_empty() {
        bail!("Email is required");
    }
    Ok(email)
}

fn prompt_password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("{label}: "))?;
    if password.is_empty() {
        bail!("Password is required");
    }
    Ok(password)
}

async fn reset_password(manager: &SessionManager, token: &str) -> Result<()> {
    let new_password = prompt_password("New password")?;
    let confirm_password = prompt_password("Confirm password")?;
    let ack = manager
        .confirm_password_reset(token, &new_password, &confirm_password)
        .await?;
    println!(
        "{}",
        ack.message
            .unwrap_or_else(|| "Your password has been reset. Please log in.".to_string())
    );
    Ok(())
}

/// Run one command. Returns the email to remember for the next login.
pub async fn run(
    command: Command,
    manager: &SessionManager,
    last_email: Option<&str>,
) -> Result<Option<String>> {
    debug!(?command, "Running command");
    match command {
        Command::Login { email } => {
            let email = match email {
                Some(email) => email,
                None => prompt_email(last_email)?,
            };
            let password = prompt_password("Password")?;
            println!("\nAuthenticating...");
            let session = manager.login(&email, &password).await?;
            println!("Welcome, {}!", session.greeting_name());
            Ok(Some(email))
        }
        Command::Register { name, email } => {
            let password = prompt_password("Password")?;
            let session = manager.register(&name, &email, &password).await?;
            println!("Account created. Welcome, {}!", session.greeting_name());
            Ok(Some(email))
        }
        Command::ForgotPassword { email } => {
            let ack = manager.request_password_reset(&email).await?;
            println!(
                "{}",
                ack.message
                    .unwrap_or_else(|| "Password reset link sent to your email.".to_string())
            );
            Ok(None)
        }
        Command::ResetPassword { token } => {
            reset_password(manager, &token).await?;
            Ok(None)
        }
        Command::Resume { link } => {
            match DeepLink::parse(&link)? {
                ResumeAction::ResetPassword { token } => reset_password(manager, &token).await?,
                ResumeAction::FederatedCallback { provider, token } => {
                    let session = manager
                        .complete_federated_login(ProviderResponse {
                            provider,
                            access_token: token,
                        })
                        .await?;
                    println!(
                        "Signed in with {} as {}",
                        provider.display_name(),
                        session.greeting_name()
                    );
                    return Ok(Some(session.email));
                }
            }
            Ok(None)
        }
        Command::WebReset { reset_id } => {
            let token = manager.authorized_client().resolve_web_reset(&reset_id).await?;
            println!("{}", DeepLink::reset_password_url(&token)?);
            Ok(None)
        }
        Command::WhoAmI => {
            let session = manager
                .current()
                .ok_or_else(|| anyhow!("Not logged in"))?;
            println!("{} <{}>", session.greeting_name(), session.email);
            println!("User ID:   {}", session.user_id);
            if let Some(ref role) = session.role {
                println!("Role:      {}", role);
            }
            println!(
                "Sign-in:   {}",
                if session.federated { "federated" } else { "email and password" }
            );
            println!("Since:     {}", session.created_at.format("%Y-%m-%d %H:%M UTC"));
            Ok(None)
        }
        Command::Refresh => {
            manager.refresh_credentials().await?;
            println!("Access token refreshed.");
            Ok(None)
        }
        Command::Logout => {
            manager.logout().await;
            println!("Logged out.");
            Ok(None)
        }
    }
}
