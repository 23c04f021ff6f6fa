use bson::doc;
use crewdeck_config::EmailSettings;
use crewdeck_db::models::EmailTemplate;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use mongodb::Database;
use thiserror::Error;
use tracing::info;

use crate::dao::{BaseDao, DaoError};

const TEMPLATE_WELCOME: &str = "welcome";
const TEMPLATE_LOGIN: &str = "login";
const TEMPLATE_INVITATION: &str = "invitation";
const TEMPLATE_NEW_POST: &str = "new_post";

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Malformed message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Unknown email template: {0}")]
    UnknownTemplate(String),
    #[error(transparent)]
    Dao(#[from] DaoError),
}

/// Sends templated transactional mail over SMTP. Templates live in the
/// database so they can be edited without a deploy; each is seeded from an
/// in-repo default the first time it is used. With `email.enabled = false`
/// every send becomes a logged no-op.
pub struct EmailService {
    settings: EmailSettings,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    templates: BaseDao<EmailTemplate>,
}

impl EmailService {
    pub fn new(settings: &EmailSettings, db: &Database) -> Result<Self, EmailError> {
        let transport = if settings.enabled {
            Some(
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)?
                    .port(settings.smtp_port)
                    .credentials(Credentials::new(
                        settings.smtp_username.clone(),
                        settings.smtp_password.clone(),
                    ))
                    .build(),
            )
        } else {
            None
        };

        Ok(Self {
            settings: settings.clone(),
            transport,
            templates: BaseDao::new(db, EmailTemplate::COLLECTION),
        })
    }

    pub async fn send_welcome(&self, to: &str, name: &str, link: &str) -> Result<(), EmailError> {
        self.send(to, TEMPLATE_WELCOME, &[("name", name), ("link", link)])
            .await
    }

    pub async fn send_login_link(
        &self,
        to: &str,
        name: &str,
        link: &str,
    ) -> Result<(), EmailError> {
        self.send(to, TEMPLATE_LOGIN, &[("name", name), ("link", link)])
            .await
    }

    pub async fn send_invitation(
        &self,
        to: &str,
        inviter: &str,
        team: &str,
        link: &str,
    ) -> Result<(), EmailError> {
        self.send(
            to,
            TEMPLATE_INVITATION,
            &[("inviter", inviter), ("team", team), ("link", link)],
        )
        .await
    }

    pub async fn send_new_post_notification(
        &self,
        to: &str,
        author: &str,
        team: &str,
        discussion: &str,
        link: &str,
    ) -> Result<(), EmailError> {
        self.send(
            to,
            TEMPLATE_NEW_POST,
            &[
                ("author", author),
                ("team", team),
                ("discussion", discussion),
                ("link", link),
            ],
        )
        .await
    }

    async fn send(
        &self,
        to: &str,
        template_name: &str,
        vars: &[(&str, &str)],
    ) -> Result<(), EmailError> {
        let template = self.ensure_template(template_name).await?;
        let subject = interpolate(&template.subject, vars);
        let body = interpolate(&template.body, vars);

        let Some(transport) = &self.transport else {
            info!(to = %to, template = %template_name, "Email disabled, skipping send");
            return Ok(());
        };

        let from = format!("{} <{}>", self.settings.from_name, self.settings.from_address);
        let message = Message::builder()
            .from(from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)?;

        transport.send(message).await?;
        info!(to = %to, template = %template_name, "Email sent");
        Ok(())
    }

    async fn ensure_template(&self, name: &str) -> Result<EmailTemplate, EmailError> {
        if let Some(existing) = self.templates.find_one(doc! { "name": name }).await? {
            return Ok(existing);
        }

        let (subject, body) =
            default_template(name).ok_or_else(|| EmailError::UnknownTemplate(name.to_string()))?;
        let now = bson::DateTime::now();
        let seeded = EmailTemplate {
            id: None,
            name: name.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            created_at: now,
            updated_at: now,
        };

        match self.templates.insert_one(&seeded).await {
            Ok(_) => Ok(seeded),
            // A concurrent seed of the same name won; use its copy.
            Err(DaoError::DuplicateKey(_)) => self
                .templates
                .find_one(doc! { "name": name })
                .await?
                .ok_or(DaoError::NotFound.into()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Replaces every `{{key}}` placeholder; unknown placeholders are left
/// in place so a template typo stays visible.
fn interpolate(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

fn default_template(name: &str) -> Option<(&'static str, &'static str)> {
    match name {
        TEMPLATE_WELCOME => Some((
            "Welcome to Crewdeck",
            "<p>Hi {{name}},</p>\
             <p>Welcome to Crewdeck. <a href=\"{{link}}\">Open your dashboard</a> \
             to create your first team and start a discussion.</p>",
        )),
        TEMPLATE_LOGIN => Some((
            "Your Crewdeck sign-in link",
            "<p>Hi {{name}},</p>\
             <p><a href=\"{{link}}\">Click here to sign in</a>. \
             The link works once and expires in an hour.</p>\
             <p>If you did not request this, you can ignore this message.</p>",
        )),
        TEMPLATE_INVITATION => Some((
            "You have been invited to {{team}} on Crewdeck",
            "<p>{{inviter}} invited you to join <strong>{{team}}</strong> on Crewdeck.</p>\
             <p><a href=\"{{link}}\">Accept the invitation</a>. \
             It is valid for 24 hours.</p>",
        )),
        TEMPLATE_NEW_POST => Some((
            "New post in {{discussion}}",
            "<p>{{author}} posted in <strong>{{discussion}}</strong> ({{team}}).</p>\
             <p><a href=\"{{link}}\">Open the discussion</a> to read it.</p>",
        )),
        _ => None,
    }
}
