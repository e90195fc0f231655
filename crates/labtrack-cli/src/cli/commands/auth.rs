//! Auth command handlers.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use labtrack_core::AppContext;
use labtrack_core::auth::{
    CredentialStore as _, FileCredentialStore, RegisterOutcome, RegistrationProfile, mask_token,
};

pub async fn login(
    ctx: &AppContext,
    email: &str,
    password: Option<String>,
    remember_me: bool,
) -> Result<()> {
    let password = resolve_password(password)?;
    let session = ctx
        .controller
        .login(email, &password, remember_me)
        .await
        .context("login failed")?;

    println!("  Signed in as {} ({})", session.display_name(), session.role);
    print_credentials_location();
    Ok(())
}

pub fn logout(ctx: &AppContext) -> Result<()> {
    let had_credentials = ctx.controller.logout()?;
    if had_credentials {
        print_credentials_location();
    } else {
        println!("  No stored credentials were found.");
    }
    Ok(())
}

pub async fn register(
    ctx: &AppContext,
    email: String,
    first_name: String,
    last_name: String,
    password: Option<String>,
) -> Result<()> {
    let profile = RegistrationProfile {
        email,
        password: resolve_password(password)?,
        first_name,
        last_name,
    };

    let outcome = ctx
        .controller
        .register(&profile)
        .await
        .context("registration failed")?;
    // Verification-pending accounts get their follow-up from the navigator.
    if let RegisterOutcome::Registered { session, .. } = outcome {
        println!("  Signed in as {}", session.display_name());
    }
    Ok(())
}

pub async fn verify_email(ctx: &AppContext, email: &str, code: &str) -> Result<()> {
    let session = ctx
        .controller
        .verify_email(email, code)
        .await
        .context("email verification failed")?;
    println!("  Signed in as {}", session.display_name());
    Ok(())
}

pub async fn resend_verification(ctx: &AppContext, email: &str) -> Result<()> {
    ctx.controller
        .resend_verification(email)
        .await
        .context("could not resend verification code")?;
    Ok(())
}

pub async fn forgot_password(ctx: &AppContext, email: &str) -> Result<()> {
    ctx.controller
        .forgot_password(email)
        .await
        .context("could not request password reset")?;
    Ok(())
}

pub async fn whoami(ctx: &AppContext) -> Result<()> {
    let Some(session) = ctx
        .controller
        .verify_session()
        .await
        .context("could not verify stored session")?
    else {
        println!("Not logged in.");
        return Ok(());
    };

    println!("{} <{}>", session.display_name(), session.email);
    println!("  Role: {}", session.role);
    println!("  User ID: {}", session.user_id);
    if !session.email_verified {
        println!("  Email not verified");
    }
    let store = FileCredentialStore::open_default();
    if let Some(token) = store.access_token()? {
        println!("  Token: {}", mask_token(&token));
    }
    Ok(())
}

fn print_credentials_location() {
    let store = FileCredentialStore::open_default();
    println!("  Credentials file: {}", store.path().display());
}

/// Uses the flag value, or reads one line from stdin.
fn resolve_password(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        print!("Password: ");
        io::stdout().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line).context("read password")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }
    Ok(password)
}
