//! Checkpoints as rows of a SQLite database.
use std::path::Path;

use rusqlite::{Connection, ErrorCode, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{Checkpoint, CheckpointStore};
use crate::element::{ElementId, Nonce};
use crate::error::{Error, Result};
use crate::primitives::Parameters;
use crate::util::parse_hex;

pub struct SqliteStore {
    db: Connection,
}

fn create_tables(db: &Connection) -> rusqlite::Result<()> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS parameters (
             id             INTEGER PRIMARY KEY CHECK (id = 0),
             modulus        TEXT NOT NULL,
             initial_value  TEXT NOT NULL
         )",
        [],
    )?;
    db.execute(
        "CREATE TABLE IF NOT EXISTS checkpoints (
             batch_index  INTEGER PRIMARY KEY,
             accumulator  TEXT NOT NULL,
             elements     BLOB NOT NULL, -- bincode Vec<ElementId>
             nonces       BLOB NOT NULL, -- bincode Vec<u64>, may be empty
             created_at   TEXT NOT NULL
         )",
        [],
    )?;
    Ok(())
}

fn sql_index(batch_index: u64) -> Result<i64> {
    i64::try_from(batch_index)
        .map_err(|_| Error::InvalidParameter(format!("batch index {batch_index} out of range")))
}

fn hex_column(value: &str) -> Result<rug::Integer> {
    parse_hex(value)
        .ok_or_else(|| Error::InvalidParameter(format!("stored value {value:?} is not hex")))
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        create_tables(&db)?;
        Ok(Self { db })
    }
}

impl CheckpointStore for SqliteStore {
    fn save_parameters(&mut self, params: &Parameters) -> Result<()> {
        match self.load_parameters() {
            Ok(existing) if existing == *params => return Ok(()),
            Ok(_) => return Err(Error::ParametersMismatch),
            Err(Error::MissingParameters) => {}
            Err(e) => return Err(e),
        }
        self.db.execute(
            "INSERT INTO parameters (id, modulus, initial_value) VALUES (0, ?1, ?2)",
            rusqlite::params![
                params.modulus().to_string_radix(16),
                params.initial_value().to_string_radix(16),
            ],
        )?;
        Ok(())
    }

    fn load_parameters(&self) -> Result<Parameters> {
        let row: Option<(String, String)> = self
            .db
            .query_row(
                "SELECT modulus, initial_value FROM parameters WHERE id = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (modulus, initial_value) = row.ok_or(Error::MissingParameters)?;
        Parameters::new(hex_column(&modulus)?, hex_column(&initial_value)?)
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let created_at = checkpoint
            .created_at
            .format(&Rfc3339)
            .map_err(|e| Error::Timestamp(e.to_string()))?;
        let result = self.db.execute(
            "INSERT INTO checkpoints (batch_index, accumulator, elements, nonces, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                sql_index(checkpoint.batch_index)?,
                checkpoint.accumulator.to_string_radix(16),
                bincode::serialize(&checkpoint.elements)?,
                bincode::serialize(&checkpoint.nonces)?,
                created_at,
            ],
        );
        match result {
            Ok(_) => {
                log::debug!("stored checkpoint {}", checkpoint.batch_index);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(Error::CheckpointExists(checkpoint.batch_index))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn load(&self, batch_index: u64) -> Result<Checkpoint> {
        let row: Option<(String, Vec<u8>, Vec<u8>, String)> = self
            .db
            .query_row(
                "SELECT accumulator, elements, nonces, created_at
                 FROM checkpoints WHERE batch_index = ?1",
                [sql_index(batch_index)?],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let (accumulator, elements, nonces, created_at) =
            row.ok_or(Error::CheckpointNotFound(batch_index))?;
        Ok(Checkpoint {
            batch_index,
            accumulator: hex_column(&accumulator)?,
            elements: bincode::deserialize::<Vec<ElementId>>(&elements)?,
            nonces: bincode::deserialize::<Vec<Nonce>>(&nonces)?,
            created_at: OffsetDateTime::parse(&created_at, &Rfc3339)
                .map_err(|e| Error::Timestamp(e.to_string()))?,
        })
    }

    fn indices(&self) -> Result<Vec<u64>> {
        let mut stmt = self
            .db
            .prepare("SELECT batch_index FROM checkpoints ORDER BY batch_index")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut indices = Vec::new();
        for index in rows {
            let index = index?;
            indices.push(u64::try_from(index).map_err(|_| {
                Error::InvalidParameter(format!("negative batch index {index} in store"))
            })?);
        }
        Ok(indices)
    }
}
