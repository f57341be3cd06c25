use anyhow::{anyhow, Result};

use crate::api::SahliClient;
use crate::error::ApiError;
use crate::field_errors::FieldErrors;
use crate::types::RegisterOutcome;

/// Render field errors as indented `field: message` lines.
pub fn describe_field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("  {}: {}", field, message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turn a rejected form submission into a readable error, preferring
/// per-field messages when the server sent any.
fn form_error(action: &str, e: ApiError) -> anyhow::Error {
    let fields = e
        .validation_issues()
        .map(|issues| FieldErrors::from_issues(&issues))
        .unwrap_or_default();
    if fields.is_empty() {
        anyhow!("{} failed: {}", action, e)
    } else {
        anyhow!("{} failed:\n{}", action, describe_field_errors(&fields))
    }
}

pub async fn login(client: &SahliClient, email: &str, password: &str) -> Result<()> {
    let resp = client
        .login(email.trim(), password)
        .await
        .map_err(|e| anyhow!("Login failed: {}", e))?;
    if client.session().access().is_none() {
        return Err(anyhow!("Login failed: server returned no access token"));
    }
    let who = resp
        .user
        .as_ref()
        .and_then(|u| u.name.clone().or_else(|| u.email.clone()))
        .unwrap_or_else(|| email.trim().to_string());
    tracing::info!(user = %who, "signed in");
    println!("Signed in as {}", who);
    Ok(())
}

pub async fn register(client: &SahliClient, name: &str, email: &str, password: &str) -> Result<()> {
    let outcome = client
        .register(name.trim(), email.trim(), password)
        .await
        .map_err(|e| form_error("Registration", e))?;
    match outcome {
        RegisterOutcome::Pending { pending_id } => {
            println!("Check {} for a verification code.", email.trim());
            println!("Pending ID: {}", pending_id);
            println!();
            println!("Next: sahli verify --pending-id {} --code <CODE>", pending_id);
        }
        RegisterOutcome::Registered(user) => {
            println!("Registered {}", user.email.as_deref().unwrap_or(&user.id));
            println!("Next: sahli login --email {} --password <PASSWORD>", email.trim());
        }
    }
    Ok(())
}

pub async fn verify(client: &SahliClient, pending_id: &str, code: &str) -> Result<()> {
    match client.verify_signup(pending_id.trim(), code.trim()).await {
        Ok(_) => {
            println!("Account verified. You can now run `sahli login`.");
            Ok(())
        }
        Err(e) => {
            let detail = e
                .validation_issues()
                .and_then(|issues| issues.into_iter().find_map(|i| i.message))
                .unwrap_or_else(|| e.to_string());
            Err(anyhow!("Verification failed: {}", detail))
        }
    }
}

pub async fn whoami(client: &SahliClient) -> Result<()> {
    match client.me().await? {
        Some(user) => {
            println!("{}", user.name.as_deref().unwrap_or("(no name)"));
            if let Some(email) = &user.email {
                println!("  Email: {}", email);
            }
            println!("  ID:    {}", user.id);
            if let Some(saved) = client.session().saved_at() {
                println!("  Since: {}", saved);
            }
        }
        None => println!("Not signed in. Run `sahli login`."),
    }
    Ok(())
}

pub fn logout(client: &SahliClient) -> Result<()> {
    client.logout()?;
    println!("Signed out.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use crate::transport::fake::ScriptedTransport;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn login_stores_tokens() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(
            200,
            json!({"success": true, "data": {"access": "A", "refresh": "R", "user": {"_id": "u1", "name": "Rana"}}}),
        );
        let session = Arc::new(MemorySessionStore::new());
        let client = SahliClient::new(transport, session.clone());
        login(&client, "rana@example.com", "pw").await.unwrap();
        assert_eq!(client.session().access().as_deref(), Some("A"));
        assert_eq!(client.session().refresh().as_deref(), Some("R"));
    }

    #[tokio::test]
    async fn register_errors_list_first_message_per_field() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(
            422,
            json!({"success": false, "message": "Validation failed", "data": [
                {"field": "email", "message": "Email already registered"},
                {"field": "email", "message": "Email invalid"},
                {"path": "password", "msg": "Password too short"}
            ]}),
        );
        let client = SahliClient::new(transport, Arc::new(MemorySessionStore::new()));
        let err = register(&client, "Rana", "rana@example.com", "pw").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Registration failed:\n  email: Email already registered\n  password: Password too short"
        );
    }

    #[tokio::test]
    async fn verify_surfaces_first_issue() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(
            400,
            json!({"success": false, "message": "Bad request", "data": [{"message": "Code expired"}]}),
        );
        let client = SahliClient::new(transport, Arc::new(MemorySessionStore::new()));
        let err = verify(&client, "p1", "123456").await.unwrap_err();
        assert_eq!(err.to_string(), "Verification failed: Code expired");
    }
}
