//! Attachment downloads via `get_file` + `download_file`.

use async_trait::async_trait;
use base64::Engine;
use teloxide::net::Download;
use teloxide::prelude::*;
use tracing::debug;

use slyusha_agent::pipeline::attach::{InlineMedia, MediaRef};
use slyusha_agent::pipeline::{FetchError, MediaFetcher};

pub struct TelegramFetcher {
    bot: Bot,
}

impl TelegramFetcher {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MediaFetcher for TelegramFetcher {
    async fn fetch(&self, media: &MediaRef, byte_limit: u64) -> Result<InlineMedia, FetchError> {
        let file = self
            .bot
            .get_file(media.file_id.as_str())
            .await
            .map_err(|e| FetchError::Missing(e.to_string()))?;

        let size = u64::from(file.size);
        if size > byte_limit {
            return Err(FetchError::TooLarge {
                size,
                limit: byte_limit,
            });
        }

        // The buffer lives only until it is encoded.
        let data = {
            let mut buf: Vec<u8> = Vec::with_capacity(size as usize);
            self.bot
                .download_file(&file.path, &mut buf)
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            base64::engine::general_purpose::STANDARD.encode(&buf)
        };

        debug!(file_id = %media.file_id, kind = ?media.kind, size, "attachment fetched");
        Ok(InlineMedia {
            mime_type: media.mime_type.clone(),
            data,
        })
    }
}
