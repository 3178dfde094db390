use rusqlite::{Connection, Result};

/// Initialise the chat state table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_chat_states_table(conn)
}

/// One JSON document per chat. The whole `ChatState` lives in `doc`.
fn create_chat_states_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_states (
            chat_id     INTEGER PRIMARY KEY,
            doc         TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );",
    )
}
