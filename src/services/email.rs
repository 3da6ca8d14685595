// src/services/email.rs
use crate::common::safe_email_log;
use crate::services::settings::{SettingsError, SettingsService};
use aws_config::BehaviorVersion;
use aws_sdk_sesv2::config::{Credentials, Region};
use aws_sdk_sesv2::Client as SesClient;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("AWS credentials not configured")]
    NotConfigured,

    #[error("SES operation failed: {0}")]
    SESError(String),

    #[error("Settings error: {0}")]
    SettingsError(#[from] SettingsError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone)]
pub struct SesConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub from_email: String,
    pub region: String,
}

/// Sends account lifecycle emails through AWS SES.
///
/// Credentials come from system settings (with environment fallback), so a
/// deployment with no SES configuration fails fast with `NotConfigured`
/// instead of attempting a send.
#[derive(Debug)]
pub struct EmailService {
    settings_service: Arc<SettingsService>,
    frontend_url: String,
}

impl EmailService {
    pub fn new(settings_service: Arc<SettingsService>, frontend_url: String) -> Self {
        Self {
            settings_service,
            frontend_url,
        }
    }

    /// Get SES configuration from settings
    pub async fn get_config(&self) -> Result<SesConfig, EmailError> {
        let keys = [
            "aws_access_key_id",
            "aws_secret_access_key",
            "aws_ses_from_email",
            "aws_ses_region",
        ];

        let settings = self.settings_service.get_settings(&keys).await?;

        let access_key_id = settings
            .get("aws_access_key_id")
            .and_then(|v| v.clone())
            .ok_or(EmailError::NotConfigured)?;

        let secret_access_key = settings
            .get("aws_secret_access_key")
            .and_then(|v| v.clone())
            .ok_or(EmailError::NotConfigured)?;

        let from_email = settings
            .get("aws_ses_from_email")
            .and_then(|v| v.clone())
            .unwrap_or_else(|| "".to_string());

        let region = settings
            .get("aws_ses_region")
            .and_then(|v| v.clone())
            .unwrap_or_else(|| "us-east-1".to_string());

        Ok(SesConfig {
            access_key_id,
            secret_access_key,
            from_email,
            region,
        })
    }

    /// Initialize SES client with credentials from settings
    async fn get_ses_client(&self) -> Result<(SesClient, String), EmailError> {
        let config = self.get_config().await?;

        if config.from_email.is_empty() {
            return Err(EmailError::InvalidConfig(
                "SES from email not configured".to_string(),
            ));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "settings",
        );

        let region = Region::new(config.region.clone());

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials)
            .load()
            .await;

        let client = SesClient::new(&aws_config);

        Ok((client, config.from_email))
    }

    /// Send an HTML email via SES
    pub async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let (client, from_email) = self.get_ses_client().await?;

        use aws_sdk_sesv2::types::{Body as SesBody, Content, Destination, EmailContent, Message};

        let destination = Destination::builder().to_addresses(to).build();

        let subject_content = Content::builder()
            .data(subject)
            .charset("UTF-8")
            .build()
            .map_err(|e| EmailError::SESError(format!("Failed to build subject: {}", e)))?;

        let body_content = Content::builder()
            .data(body)
            .charset("UTF-8")
            .build()
            .map_err(|e| EmailError::SESError(format!("Failed to build body: {}", e)))?;

        let ses_body = SesBody::builder().html(body_content).build();

        let message = Message::builder()
            .subject(subject_content)
            .body(ses_body)
            .build();

        let email_content = EmailContent::builder().simple(message).build();

        let result = client
            .send_email()
            .from_email_address(&from_email)
            .destination(destination)
            .content(email_content)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, to = %safe_email_log(to), "Failed to send email via SES");
                EmailError::SESError(format!("Send failed: {}", e))
            })?;

        info!(
            to = %safe_email_log(to),
            message_id = ?result.message_id(),
            "Email sent successfully via SES"
        );

        Ok(())
    }

    /// Send the address-verification email issued on sign-up and resend
    pub async fn send_verification_email(
        &self,
        to: &str,
        full_name: Option<&str>,
        token: &str,
    ) -> Result<(), EmailError> {
        let link = format!("{}/verify-email?token={}", self.frontend_url, token);
        let body = generate_verification_email(full_name.unwrap_or("there"), &link);

        self.send_email(to, "Verify your email address", &body)
            .await
    }

    /// Send the password-reset email with its one-hour link
    pub async fn send_password_reset_email(
        &self,
        to: &str,
        full_name: Option<&str>,
        token: &str,
    ) -> Result<(), EmailError> {
        let link = format!("{}/reset-password?token={}", self.frontend_url, token);
        let body = generate_password_reset_email(full_name.unwrap_or("there"), &link);

        self.send_email(to, "Reset your password", &body).await
    }
}

fn generate_verification_email(name: &str, link: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .header {{ background-color: #4F46E5; color: white; padding: 20px; text-align: center; }}
        .content {{ padding: 20px; background-color: #f9f9f9; }}
        .footer {{ padding: 20px; text-align: center; font-size: 12px; color: #666; }}
        .button {{ display: inline-block; padding: 12px 24px; background-color: #4F46E5; color: white; text-decoration: none; border-radius: 5px; margin: 10px 0; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Verify Your Email</h1>
        </div>
        <div class="content">
            <p>Hi {},</p>

            <p>Thanks for signing up! Please confirm your email address by clicking the button below.</p>

            <p style="text-align: center;">
                <a href="{}" class="button">Verify Email</a>
            </p>

            <p>If the button does not work, copy and paste this link into your browser:</p>
            <p><a href="{}">{}</a></p>

            <p>This link will expire in 24 hours. If you did not create an account, you can safely ignore this email.</p>
        </div>
        <div class="footer">
            <p>This is an automated message. Please do not reply directly to this email.</p>
        </div>
    </div>
</body>
</html>"#,
        name, link, link, link
    )
}

fn generate_password_reset_email(name: &str, link: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .header {{ background-color: #DC2626; color: white; padding: 20px; text-align: center; }}
        .content {{ padding: 20px; background-color: #f9f9f9; }}
        .footer {{ padding: 20px; text-align: center; font-size: 12px; color: #666; }}
        .button {{ display: inline-block; padding: 12px 24px; background-color: #DC2626; color: white; text-decoration: none; border-radius: 5px; margin: 10px 0; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Reset Your Password</h1>
        </div>
        <div class="content">
            <p>Hi {},</p>

            <p>We received a request to reset the password for your account. Click the button below to choose a new one.</p>

            <p style="text-align: center;">
                <a href="{}" class="button">Reset Password</a>
            </p>

            <p>If the button does not work, copy and paste this link into your browser:</p>
            <p><a href="{}">{}</a></p>

            <p>This link will expire in 1 hour. If you did not request a password reset, you can safely ignore this email and your password will remain unchanged.</p>
        </div>
        <div class="footer">
            <p>This is an automated message. Please do not reply directly to this email.</p>
        </div>
    </div>
</body>
</html>"#,
        name, link, link, link
    )
}
