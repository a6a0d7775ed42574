use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use hearth_core::{
    append_attachments, AttachedText, ConversationHistoryEntry, GenerationRecord, GenerationSink,
    SinkError,
};

use crate::error::{StoreError, StoreResult};
use crate::files::{file_hash, normalize_content_type, validate_upload, INLINED_CONTENT_TYPES};
use crate::types::{
    title_from_message, Conversation, ConversationDetail, ConversationSummary, FileMetadata,
    NewUpload, StoredMessage, DEFAULT_TITLE,
};

#[derive(Debug, Clone)]
pub struct SqliteChatStore {
    db_path: PathBuf,
}

impl SqliteChatStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `func` on a connection opened for this call only.
    async fn with_connection<T, F>(&self, func: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let connection = open_connection(&db_path)?;
            func(&connection)
        })
        .await
        .map_err(|error| StoreError::Task(error.to_string()))?
    }

    pub async fn init(&self) -> StoreResult<()> {
        self.with_connection(|connection| {
            connection.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    title TEXT NOT NULL DEFAULT 'New Conversation',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS chat_messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id TEXT NOT NULL,
                    content TEXT NOT NULL,
                    response TEXT,
                    timestamp TEXT NOT NULL,
                    token_count INTEGER,
                    generation_time REAL,
                    model_used TEXT,
                    is_complete INTEGER NOT NULL DEFAULT 0,
                    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS uploaded_files (
                    id TEXT PRIMARY KEY,
                    filename TEXT NOT NULL,
                    content_type TEXT NOT NULL,
                    size INTEGER NOT NULL,
                    file_hash TEXT NOT NULL,
                    file_data BLOB NOT NULL,
                    uploaded_at TEXT NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    user_id TEXT NOT NULL,
                    conversation_id TEXT NOT NULL,
                    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS message_files (
                    message_id INTEGER NOT NULL,
                    file_id TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    PRIMARY KEY(message_id, file_id),
                    FOREIGN KEY(message_id) REFERENCES chat_messages(id) ON DELETE CASCADE,
                    FOREIGN KEY(file_id) REFERENCES uploaded_files(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_conversation_user ON conversations(user_id, updated_at);
                CREATE INDEX IF NOT EXISTS idx_message_conversation ON chat_messages(conversation_id);
                CREATE INDEX IF NOT EXISTS idx_file_conversation ON uploaded_files(conversation_id);
                CREATE INDEX IF NOT EXISTS idx_file_user ON uploaded_files(user_id, is_active);
                "#,
            )?;
            Ok(())
        })
        .await
    }

    pub async fn create_conversation(&self, user_id: &str) -> StoreResult<Conversation> {
        let user_id = user_id.to_string();

        self.with_connection(move |connection| {
            let created = now();
            let conversation = Conversation {
                id: uuid::Uuid::new_v4().to_string(),
                user_id,
                title: DEFAULT_TITLE.to_string(),
                created_at: created,
                updated_at: created,
            };
            connection.execute(
                r#"
                INSERT INTO conversations (id, user_id, title, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4)
                "#,
                params![
                    conversation.id,
                    conversation.user_id,
                    conversation.title,
                    format_timestamp(created)
                ],
            )?;
            Ok(conversation)
        })
        .await
    }

    /// The user's conversations, most recently updated first.
    pub async fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<ConversationSummary>> {
        let user_id = user_id.to_string();

        self.with_connection(move |connection| {
            let mut statement = connection.prepare(
                r#"
                SELECT c.id, c.user_id, c.title, c.created_at, c.updated_at,
                    (SELECT m.content FROM chat_messages m
                        WHERE m.conversation_id = c.id ORDER BY m.id DESC LIMIT 1),
                    (SELECT m.response FROM chat_messages m
                        WHERE m.conversation_id = c.id ORDER BY m.id DESC LIMIT 1)
                FROM conversations c
                WHERE c.user_id = ?1
                ORDER BY c.updated_at DESC, c.rowid DESC
                "#,
            )?;

            let rows = statement
                .query_map(params![user_id], |row| {
                    Ok((
                        read_conversation(row)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(raw, last_message, last_response)| -> StoreResult<ConversationSummary> {
                    Ok(ConversationSummary {
                        conversation: raw.into_conversation()?,
                        last_message,
                        last_response,
                    })
                })
                .collect()
        })
        .await
    }

    pub async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> StoreResult<ConversationDetail> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();

        self.with_connection(move |connection| {
            let conversation = load_conversation(connection, &user_id, &conversation_id)?;
            let messages = load_messages(connection, &conversation_id)?;
            Ok(ConversationDetail {
                conversation,
                messages,
            })
        })
        .await
    }

    /// Rename a conversation. A blank title leaves it unchanged.
    pub async fn rename_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
        title: &str,
    ) -> StoreResult<Conversation> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        let title = title.trim().to_string();

        self.with_connection(move |connection| {
            let conversation = load_conversation(connection, &user_id, &conversation_id)?;
            if title.is_empty() {
                return Ok(conversation);
            }

            connection.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, format_timestamp(now()), conversation_id],
            )?;
            load_conversation(connection, &user_id, &conversation_id)
        })
        .await
    }

    /// Delete a conversation with its messages and files.
    pub async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> StoreResult<()> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();

        self.with_connection(move |connection| {
            let deleted = connection.execute(
                "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!(
                    "conversation {}",
                    conversation_id
                )));
            }
            Ok(())
        })
        .await
    }

    /// Record a user message with an empty response.
    ///
    /// Every id in `file_ids` must name an active file of the caller in the same conversation.
    /// The first message of a conversation also becomes its title.
    pub async fn insert_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        content: &str,
        file_ids: &[String],
    ) -> StoreResult<StoredMessage> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        let content = content.to_string();
        let mut unique_ids: Vec<String> = Vec::with_capacity(file_ids.len());
        for id in file_ids {
            if !unique_ids.contains(id) {
                unique_ids.push(id.clone());
            }
        }

        self.with_connection(move |connection| {
            let tx = connection.unchecked_transaction()?;
            load_conversation(&tx, &user_id, &conversation_id)?;

            for file_id in &unique_ids {
                let usable: i64 = tx.query_row(
                    r#"
                    SELECT COUNT(*) FROM uploaded_files
                    WHERE id = ?1 AND user_id = ?2 AND conversation_id = ?3 AND is_active = 1
                    "#,
                    params![file_id, user_id, conversation_id],
                    |row| row.get(0),
                )?;
                if usable == 0 {
                    return Err(StoreError::InvalidFile(format!(
                        "file {} is not available in this conversation",
                        file_id
                    )));
                }
            }

            let now = format_timestamp(now());
            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM chat_messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            if existing == 0 {
                if let Some(title) = title_from_message(&content) {
                    tx.execute(
                        "UPDATE conversations SET title = ?1 WHERE id = ?2",
                        params![title, conversation_id],
                    )?;
                }
            }

            tx.execute(
                r#"
                INSERT INTO chat_messages (conversation_id, content, timestamp, is_complete)
                VALUES (?1, ?2, ?3, 0)
                "#,
                params![conversation_id, content, now],
            )?;
            let message_id = tx.last_insert_rowid();

            for (position, file_id) in unique_ids.iter().enumerate() {
                tx.execute(
                    "INSERT INTO message_files (message_id, file_id, position) VALUES (?1, ?2, ?3)",
                    params![message_id, file_id, position as i64],
                )?;
            }

            tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now, conversation_id],
            )?;
            tx.commit()?;

            load_message(connection, message_id)
        })
        .await
    }

    /// Snapshot of the messages before `before_message_id`, oldest first, with attached text files
    /// inlined into the user text.
    pub async fn history(
        &self,
        conversation_id: &str,
        before_message_id: i64,
    ) -> StoreResult<Vec<ConversationHistoryEntry>> {
        let conversation_id = conversation_id.to_string();

        self.with_connection(move |connection| {
            let mut statement = connection.prepare(
                r#"
                SELECT id, content, response FROM chat_messages
                WHERE conversation_id = ?1 AND id < ?2
                ORDER BY id ASC
                "#,
            )?;
            let rows = statement
                .query_map(params![conversation_id, before_message_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .enumerate()
                .map(|(position, (message_id, content, response))| -> StoreResult<ConversationHistoryEntry> {
                    let attachments = load_attached_texts(connection, message_id)?;
                    Ok(ConversationHistoryEntry::new(
                        append_attachments(&content, &attachments),
                        response,
                        position as i64,
                    ))
                })
                .collect()
        })
        .await
    }

    /// Inlined text files attached to one message.
    pub async fn attached_texts(&self, message_id: i64) -> StoreResult<Vec<AttachedText>> {
        self.with_connection(move |connection| load_attached_texts(connection, message_id))
            .await
    }

    /// Conversation id of a message the user owns.
    pub async fn message_conversation(&self, user_id: &str, message_id: i64) -> StoreResult<String> {
        let user_id = user_id.to_string();

        self.with_connection(move |connection| {
            connection
                .query_row(
                    r#"
                    SELECT m.conversation_id FROM chat_messages m
                    JOIN conversations c ON c.id = m.conversation_id
                    WHERE m.id = ?1 AND c.user_id = ?2
                    "#,
                    params![message_id, user_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("message {}", message_id)))
        })
        .await
    }

    pub async fn insert_file(
        &self,
        user_id: &str,
        conversation_id: &str,
        upload: NewUpload,
    ) -> StoreResult<FileMetadata> {
        validate_upload(&upload)?;
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();

        self.with_connection(move |connection| {
            load_conversation(connection, &user_id, &conversation_id)?;

            let metadata = FileMetadata {
                id: uuid::Uuid::new_v4().to_string(),
                filename: upload.filename.trim().to_string(),
                content_type: normalize_content_type(&upload.content_type),
                size: upload.data.len() as i64,
                uploaded_at: now(),
            };
            connection.execute(
                r#"
                INSERT INTO uploaded_files (
                    id, filename, content_type, size, file_hash, file_data,
                    uploaded_at, is_active, user_id, conversation_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)
                "#,
                params![
                    metadata.id,
                    metadata.filename,
                    metadata.content_type,
                    metadata.size,
                    file_hash(&upload.data),
                    upload.data,
                    format_timestamp(metadata.uploaded_at),
                    user_id,
                    conversation_id
                ],
            )?;
            log::info!(
                "[{}] Stored file {} ({} bytes)",
                conversation_id,
                metadata.id,
                metadata.size
            );
            Ok(metadata)
        })
        .await
    }

    /// Active files of a conversation the user owns.
    pub async fn conversation_files(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> StoreResult<Vec<FileMetadata>> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();

        self.with_connection(move |connection| {
            load_conversation(connection, &user_id, &conversation_id)?;

            let mut statement = connection.prepare(
                r#"
                SELECT id, filename, content_type, size, uploaded_at FROM uploaded_files
                WHERE conversation_id = ?1 AND user_id = ?2 AND is_active = 1
                ORDER BY uploaded_at ASC
                "#,
            )?;
            let rows = statement
                .query_map(params![conversation_id, user_id], read_file_metadata)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(RawFile::into_metadata).collect()
        })
        .await
    }

    /// Mark every active file of the user inactive. Returns how many changed.
    pub async fn deactivate_user_files(&self, user_id: &str) -> StoreResult<usize> {
        let user_id = user_id.to_string();

        self.with_connection(move |connection| {
            let changed = connection.execute(
                "UPDATE uploaded_files SET is_active = 0 WHERE user_id = ?1 AND is_active = 1",
                params![user_id],
            )?;
            Ok(changed)
        })
        .await
    }

    /// Write the outcome of a generation onto its message.
    pub async fn update_generation(&self, record: GenerationRecord) -> StoreResult<()> {
        self.with_connection(move |connection| {
            let updated = connection.execute(
                r#"
                UPDATE chat_messages
                SET response = ?1, generation_time = ?2, token_count = ?3,
                    model_used = ?4, is_complete = ?5
                WHERE id = ?6
                "#,
                params![
                    record.text,
                    record.elapsed_secs,
                    record.estimated_tokens as i64,
                    record.model,
                    record.completed,
                    record.message_id
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("message {}", record.message_id)));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl GenerationSink for SqliteChatStore {
    async fn persist(&self, record: GenerationRecord) -> Result<(), SinkError> {
        let message_id = record.message_id;
        self.update_generation(record).await.map_err(|error| match error {
            StoreError::NotFound(_) => SinkError::MessageNotFound(message_id),
            other => SinkError::Backend(other.to_string()),
        })
    }
}

fn open_connection(path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let connection = Connection::open(path)?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        "#,
    )?;
    Ok(connection)
}

// Stored precision, so returned values equal what a later read yields.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// Fixed-width UTC so string order matches time order.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

struct RawConversation {
    id: String,
    user_id: String,
    title: String,
    created_at: String,
    updated_at: String,
}

impl RawConversation {
    fn into_conversation(self) -> StoreResult<Conversation> {
        Ok(Conversation {
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            user_id: self.user_id,
            title: self.title,
        })
    }
}

fn read_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawConversation> {
    Ok(RawConversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn load_conversation(
    connection: &Connection,
    user_id: &str,
    conversation_id: &str,
) -> StoreResult<Conversation> {
    connection
        .query_row(
            r#"
            SELECT id, user_id, title, created_at, updated_at FROM conversations
            WHERE id = ?1 AND user_id = ?2
            "#,
            params![conversation_id, user_id],
            read_conversation,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("conversation {}", conversation_id)))?
        .into_conversation()
}

struct RawFile {
    id: String,
    filename: String,
    content_type: String,
    size: i64,
    uploaded_at: String,
}

impl RawFile {
    fn into_metadata(self) -> StoreResult<FileMetadata> {
        Ok(FileMetadata {
            uploaded_at: parse_timestamp(&self.uploaded_at)?,
            id: self.id,
            filename: self.filename,
            content_type: self.content_type,
            size: self.size,
        })
    }
}

fn read_file_metadata(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawFile> {
    Ok(RawFile {
        id: row.get(0)?,
        filename: row.get(1)?,
        content_type: row.get(2)?,
        size: row.get(3)?,
        uploaded_at: row.get(4)?,
    })
}

fn load_message_files(connection: &Connection, message_id: i64) -> StoreResult<Vec<FileMetadata>> {
    let mut statement = connection.prepare(
        r#"
        SELECT f.id, f.filename, f.content_type, f.size, f.uploaded_at
        FROM message_files mf
        JOIN uploaded_files f ON f.id = mf.file_id
        WHERE mf.message_id = ?1 AND f.is_active = 1
        ORDER BY mf.position ASC
        "#,
    )?;
    let rows = statement
        .query_map(params![message_id], read_file_metadata)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(RawFile::into_metadata).collect()
}

fn load_attached_texts(connection: &Connection, message_id: i64) -> StoreResult<Vec<AttachedText>> {
    let mut statement = connection.prepare(
        r#"
        SELECT f.filename, f.content_type, f.file_data
        FROM message_files mf
        JOIN uploaded_files f ON f.id = mf.file_id
        WHERE mf.message_id = ?1 AND f.is_active = 1
        ORDER BY mf.position ASC
        "#,
    )?;
    let rows = statement
        .query_map(params![message_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter(|(_, content_type, _)| INLINED_CONTENT_TYPES.contains(&content_type.as_str()))
        .map(|(filename, _, data)| AttachedText {
            filename,
            content: String::from_utf8_lossy(&data).into_owned(),
        })
        .collect())
}

struct RawMessage {
    id: i64,
    conversation_id: String,
    content: String,
    response: Option<String>,
    timestamp: String,
    token_count: Option<i64>,
    generation_time: Option<f64>,
    model_used: Option<String>,
    is_complete: bool,
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, content, response, timestamp, token_count, \
                               generation_time, model_used, is_complete";

fn read_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessage> {
    Ok(RawMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        content: row.get(2)?,
        response: row.get(3)?,
        timestamp: row.get(4)?,
        token_count: row.get(5)?,
        generation_time: row.get(6)?,
        model_used: row.get(7)?,
        is_complete: row.get(8)?,
    })
}

fn into_stored_message(connection: &Connection, raw: RawMessage) -> StoreResult<StoredMessage> {
    Ok(StoredMessage {
        attached_files: load_message_files(connection, raw.id)?,
        timestamp: parse_timestamp(&raw.timestamp)?,
        id: raw.id,
        conversation_id: raw.conversation_id,
        content: raw.content,
        response: raw.response,
        token_count: raw.token_count,
        generation_time: raw.generation_time,
        model_used: raw.model_used,
        is_complete: raw.is_complete,
    })
}

fn load_message(connection: &Connection, message_id: i64) -> StoreResult<StoredMessage> {
    let raw = connection
        .query_row(
            &format!("SELECT {} FROM chat_messages WHERE id = ?1", MESSAGE_COLUMNS),
            params![message_id],
            read_message,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("message {}", message_id)))?;
    into_stored_message(connection, raw)
}

fn load_messages(connection: &Connection, conversation_id: &str) -> StoreResult<Vec<StoredMessage>> {
    let mut statement = connection.prepare(&format!(
        "SELECT {} FROM chat_messages WHERE conversation_id = ?1 ORDER BY id ASC",
        MESSAGE_COLUMNS
    ))?;
    let rows = statement
        .query_map(params![conversation_id], read_message)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|raw| into_stored_message(connection, raw))
        .collect()
}
