//! Chunked upload sessions
//!
//! Large files arrive as sequential chunks keyed by file name. Chunk 0
//! resolves the header and opens a session. Rows of every chunk are
//! normalized into the session buffer, and the last chunk hands that buffer
//! back to the caller for one atomic write. Any error destroys the session.
//!
//! A session is removed from the map while its chunk is processed and only
//! put back on success, so the lock is never held during normalization and a
//! failed chunk cannot leave a half-updated buffer behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use uuid::Uuid;

use super::header::{HeaderMapping, HeaderResolver};
use super::normalize::RowNormalizer;
use super::types::{ChunkInfo, IngestError, NormalizedRecord, RawRow, ReportSchema, UploadContext};

/// Default idle time before an abandoned session is reclaimed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(900);

/// Buffered state of one in-progress chunked upload
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Correlates log lines across chunks
    pub id: Uuid,
    pub file_name: String,
    pub report_type: String,
    pub version: u32,
    pub context: UploadContext,
    pub header: HeaderMapping,
    pub total_chunks: usize,
    pub received_chunks: usize,
    pub records: Vec<NormalizedRecord>,
    pub rows_received: usize,
    pub rows_dropped: usize,
    /// Rows delivered after the footer row; never normalized
    pub rows_ignored: usize,
    pub footer_reached: bool,
    pub completed: bool,
    pub created_at: Instant,
    pub last_touched: Instant,
}

impl UploadSession {
    fn open(schema: &ReportSchema, ctx: &UploadContext, header: HeaderMapping, total_chunks: usize) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            file_name: ctx.file_name.clone(),
            report_type: schema.report_type.clone(),
            version: schema.version,
            context: ctx.clone(),
            header,
            total_chunks,
            received_chunks: 0,
            records: Vec::new(),
            rows_received: 0,
            rows_dropped: 0,
            rows_ignored: 0,
            footer_reached: false,
            completed: false,
            created_at: now,
            last_touched: now,
        }
    }

    /// Normalize one chunk's data rows into the buffer
    fn absorb(&mut self, schema: &ReportSchema, ctx: &UploadContext, rows: &[RawRow]) -> Result<(), IngestError> {
        self.rows_received += rows.len();
        if self.footer_reached {
            self.rows_ignored += rows.len();
            return Ok(());
        }

        let normalizer = RowNormalizer::new(schema, &self.header, ctx)?;
        let block = normalizer.normalize_block(rows);
        self.rows_dropped += block.dropped();
        self.rows_ignored += rows.len() - block.rows_seen;
        self.footer_reached = block.footer_reached;
        self.records.extend(block.records);
        Ok(())
    }
}

/// Progress of one chunk delivery
#[derive(Debug)]
pub enum ChunkStep {
    /// More chunks are expected
    Buffered {
        chunk_index: usize,
        total_chunks: usize,
        buffered: usize,
    },
    /// Last chunk received; the session has been closed and is handed back
    Complete(UploadSession),
}

/// Session store for chunked uploads, keyed by file name
#[derive(Debug)]
pub struct ChunkAssembler {
    sessions: Mutex<HashMap<String, UploadSession>>,
    idle_timeout: Duration,
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

impl ChunkAssembler {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UploadSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a file has a live session
    pub fn contains(&self, file_name: &str) -> bool {
        self.lock().contains_key(file_name)
    }

    /// Destroy a session, returning whether one existed
    pub fn discard(&self, file_name: &str) -> bool {
        self.lock().remove(file_name).is_some()
    }

    /// Destroy sessions idle for at least the configured timeout
    pub fn reap_idle(&self) -> usize {
        let timeout = self.idle_timeout;
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|file_name, session| {
            let idle = session.last_touched.elapsed();
            if idle >= timeout {
                log::warn!(
                    "Reclaiming abandoned upload session for '{}' ({} of {} chunks, idle {:?})",
                    file_name,
                    session.received_chunks,
                    session.total_chunks,
                    idle
                );
                false
            } else {
                true
            }
        });
        before - sessions.len()
    }

    /// Run `reap_idle` periodically on the tokio runtime
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let assembler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reaped = assembler.reap_idle();
                if reaped > 0 {
                    log::info!("Reaped {} idle upload sessions", reaped);
                }
            }
        })
    }

    /// Accept one chunk of a sequential upload
    ///
    /// Chunk 0 opens the session (replacing any live one for the same file)
    /// and must contain the header. Later chunks must arrive in order.
    pub fn accept(
        &self,
        schema: &ReportSchema,
        ctx: &UploadContext,
        chunk: ChunkInfo,
        rows: &[RawRow],
    ) -> Result<ChunkStep, IngestError> {
        self.reap_idle();
        let file_name = ctx.file_name.as_str();

        // Taken out of the map for the duration of the chunk; only a
        // successful, non-final chunk puts it back.
        let existing = self.lock().remove(file_name);

        if let Err(message) = check_position(&chunk) {
            return Err(IngestError::session(file_name, message));
        }

        let mut session = if chunk.index == 0 {
            if let Some(previous) = existing {
                log::warn!(
                    "Restarting upload of '{}': discarding session {} after {} of {} chunks",
                    file_name,
                    previous.id,
                    previous.received_chunks,
                    previous.total_chunks
                );
            }
            let header = HeaderResolver::new(schema).resolve(rows)?;
            let session = UploadSession::open(schema, ctx, header, chunk.total);
            log::info!(
                "Opened upload session {} for '{}' ({} chunks, type '{}')",
                session.id,
                file_name,
                chunk.total,
                schema.report_type
            );
            session
        } else {
            let session = existing.ok_or_else(|| {
                IngestError::session(
                    file_name,
                    format!("no upload in progress for chunk {}; chunk 0 must come first", chunk.index),
                )
            })?;
            check_continuation(&session, schema, ctx, &chunk)
                .map_err(|message| IngestError::session(file_name, message))?;
            session
        };

        let data = if chunk.index == 0 {
            &rows[session.header.data_offset.min(rows.len())..]
        } else {
            rows
        };
        session.absorb(schema, ctx, data)?;
        session.received_chunks += 1;
        session.last_touched = Instant::now();

        log::debug!(
            "Session {}: chunk {}/{} for '{}', {} records buffered",
            session.id,
            chunk.index + 1,
            chunk.total,
            file_name,
            session.records.len()
        );

        if chunk.is_last {
            session.completed = true;
            return Ok(ChunkStep::Complete(session));
        }

        let step = ChunkStep::Buffered {
            chunk_index: chunk.index,
            total_chunks: chunk.total,
            buffered: session.records.len(),
        };
        self.lock().insert(file_name.to_string(), session);
        Ok(step)
    }
}

fn check_position(chunk: &ChunkInfo) -> Result<(), String> {
    if chunk.total == 0 || chunk.index >= chunk.total {
        return Err(format!(
            "chunk index {} is out of range for {} chunks",
            chunk.index, chunk.total
        ));
    }
    if chunk.is_last != (chunk.index + 1 == chunk.total) {
        return Err(format!(
            "isLast={} disagrees with chunk {} of {}",
            chunk.is_last, chunk.index, chunk.total
        ));
    }
    Ok(())
}

fn check_continuation(
    session: &UploadSession,
    schema: &ReportSchema,
    ctx: &UploadContext,
    chunk: &ChunkInfo,
) -> Result<(), String> {
    if session.report_type != schema.report_type || session.version != schema.version {
        return Err(format!(
            "chunk is for report type '{}' but the upload started as '{}'",
            schema.report_type, session.report_type
        ));
    }
    if chunk.total != session.total_chunks {
        return Err(format!(
            "total chunks changed from {} to {}",
            session.total_chunks, chunk.total
        ));
    }
    if chunk.index != session.received_chunks {
        return Err(format!(
            "expected chunk {} but received chunk {}",
            session.received_chunks, chunk.index
        ));
    }
    if session.context.period != ctx.period {
        return Err(format!(
            "period changed from {} to {} mid-upload",
            session.context.period, ctx.period
        ));
    }
    Ok(())
}
