//! Persistent store: the single source of truth for users, applications and
//! chat messages. Every lookup the chat router or the authorization layer
//! makes for a trust decision goes through here.

use chrono::{SecondsFormat, Utc};

use super::{
    ChatMessage, CreateApplicationRequest, DbPool, GrantApplication, NewChatMessage, NewUser, User,
};

/// Uniform-precision timestamps so text ordering matches creation order.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    pub async fn create_user(&self, new_user: NewUser) -> Result<User, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let ts = now();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, full_name, phone_number, role, suspended, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.full_name)
        .bind(&new_user.phone_number)
        .bind(&new_user.role)
        .bind(&ts)
        .bind(&ts)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            email: new_user.email,
            password_hash: new_user.password_hash,
            full_name: new_user.full_name,
            phone_number: new_user.phone_number,
            role: new_user.role,
            suspended: false,
            created_at: ts.clone(),
            updated_at: ts,
        })
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Email lookup is case-insensitive; the column carries COLLATE NOCASE.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_all_users(&self) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users ORDER BY created_at ASC, rowid ASC")
            .fetch_all(&self.pool)
            .await
    }

    /// Ids of every admin account, used for broadcast fan-out.
    pub async fn admin_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM users WHERE role = 'admin'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn set_user_suspended(
        &self,
        id: &str,
        suspended: bool,
    ) -> Result<Option<User>, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET suspended = ?, updated_at = ? WHERE id = ?")
            .bind(suspended)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(id).await
    }

    // -------------------------------------------------------------------------
    // Grant applications
    // -------------------------------------------------------------------------

    pub async fn create_application(
        &self,
        req: CreateApplicationRequest,
    ) -> Result<GrantApplication, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let ts = now();
        sqlx::query(
            "INSERT INTO grant_applications
             (id, user_id, full_name, email, phone_number, address, project_title,
              project_description, grant_type, requested_amount, status, admin_notes,
              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', '', ?, ?)",
        )
        .bind(&id)
        .bind(&req.user_id)
        .bind(&req.full_name)
        .bind(&req.email)
        .bind(&req.phone_number)
        .bind(&req.address)
        .bind(&req.project_title)
        .bind(&req.project_description)
        .bind(&req.grant_type)
        .bind(req.requested_amount)
        .bind(&ts)
        .bind(&ts)
        .execute(&self.pool)
        .await?;

        Ok(GrantApplication {
            id,
            user_id: req.user_id,
            full_name: req.full_name,
            email: req.email,
            phone_number: req.phone_number,
            address: req.address,
            project_title: req.project_title,
            project_description: req.project_description,
            grant_type: req.grant_type,
            requested_amount: req.requested_amount,
            status: "pending".to_string(),
            admin_notes: String::new(),
            created_at: ts.clone(),
            updated_at: ts,
        })
    }

    pub async fn get_application(&self, id: &str) -> Result<Option<GrantApplication>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM grant_applications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_applications_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<GrantApplication>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM grant_applications WHERE user_id = ?
             ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_all_applications(&self) -> Result<Vec<GrantApplication>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM grant_applications ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await
    }

    /// Last write wins when several admins race on the same application.
    pub async fn update_application_status(
        &self,
        id: &str,
        status: &str,
        admin_notes: Option<&str>,
    ) -> Result<Option<GrantApplication>, sqlx::Error> {
        let result = match admin_notes {
            Some(notes) => {
                sqlx::query(
                    "UPDATE grant_applications SET status = ?, admin_notes = ?, updated_at = ? WHERE id = ?",
                )
                .bind(status)
                .bind(notes)
                .bind(now())
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query("UPDATE grant_applications SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(status)
                    .bind(now())
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_application(id).await
    }

    // -------------------------------------------------------------------------
    // Chat messages
    // -------------------------------------------------------------------------

    /// Every message the user sent or was targeted by, oldest first. This is
    /// both the user's own replay and the scope of an admin's targeted
    /// history request.
    pub async fn get_chat_messages_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM chat_messages WHERE user_id = ? OR target_user_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create_chat_message(
        &self,
        msg: NewChatMessage,
    ) -> Result<ChatMessage, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let ts = now();
        sqlx::query(
            "INSERT INTO chat_messages (id, user_id, sender_role, target_user_id, message, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&msg.user_id)
        .bind(&msg.sender_role)
        .bind(&msg.target_user_id)
        .bind(&msg.message)
        .bind(&ts)
        .execute(&self.pool)
        .await?;

        Ok(ChatMessage {
            id,
            user_id: msg.user_id,
            sender_role: msg.sender_role,
            target_user_id: msg.target_user_id,
            message: msg.message,
            created_at: ts,
        })
    }
}
