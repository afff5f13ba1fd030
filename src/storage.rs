//! Versioned non-volatile record holding the durable totals.
//!
//! ```text
//!  offset  field               type
//!  ──────  ──────────────────  ────
//!       0  magic               u32   guard
//!       4  version             u32   guard
//!       8  lifetime_gallons    f32
//!      12  daily_gallons       f32
//!      16  flow_events_today   i32
//!      20  hours_elapsed       i32
//!      24  watchdog_resets     i32
//!      28  daily_reset_epoch   u32
//! ```
//!
//! All values are little-endian.  The guard is checked once in
//! [`PersistentStore::begin`]; afterwards loads return the raw stored value.
//! If the guard does not match, every field is rewritten to zero and the
//! guard is written last, so a crash mid-initialisation is detected again
//! on the next boot.

use crate::app::ports::{NvmPort, StorageError};
use log::{info, warn};

pub const STORAGE_MAGIC: u32 = 0xA753_B912;
pub const STORAGE_VERSION: u32 = 1;
pub const RECORD_SIZE: usize = 32;

// ───────────────────────────────────────────────────────────────
// Logical fields
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistedField {
    Magic,
    Version,
    LifetimeGallons,
    DailyGallons,
    FlowEventsToday,
    HoursElapsed,
    WatchdogResetCount,
    DailyResetEpoch,
}

impl PersistedField {
    /// Every field in layout order.
    pub const ALL: [Self; 8] = [
        Self::Magic,
        Self::Version,
        Self::LifetimeGallons,
        Self::DailyGallons,
        Self::FlowEventsToday,
        Self::HoursElapsed,
        Self::WatchdogResetCount,
        Self::DailyResetEpoch,
    ];

    /// Fields that carry data (everything but the guard).
    pub const DATA: [Self; 6] = [
        Self::LifetimeGallons,
        Self::DailyGallons,
        Self::FlowEventsToday,
        Self::HoursElapsed,
        Self::WatchdogResetCount,
        Self::DailyResetEpoch,
    ];

    pub const fn offset(self) -> usize {
        match self {
            Self::Magic => 0,
            Self::Version => 4,
            Self::LifetimeGallons => 8,
            Self::DailyGallons => 12,
            Self::FlowEventsToday => 16,
            Self::HoursElapsed => 20,
            Self::WatchdogResetCount => 24,
            Self::DailyResetEpoch => 28,
        }
    }

    pub const fn is_guard(self) -> bool {
        matches!(self, Self::Magic | Self::Version)
    }

    /// The zero value of this field's type.
    pub const fn zero(self) -> FieldValue {
        match self {
            Self::LifetimeGallons | Self::DailyGallons => FieldValue::Gallons(0.0),
            Self::FlowEventsToday | Self::HoursElapsed | Self::WatchdogResetCount => {
                FieldValue::Count(0)
            }
            Self::Magic | Self::Version | Self::DailyResetEpoch => FieldValue::Word(0),
        }
    }

    /// Interpret a stored little-endian word as this field's type.
    pub fn decode(self, bytes: [u8; 4]) -> FieldValue {
        match self.zero() {
            FieldValue::Gallons(_) => FieldValue::Gallons(f32::from_le_bytes(bytes)),
            FieldValue::Count(_) => FieldValue::Count(i32::from_le_bytes(bytes)),
            FieldValue::Word(_) => FieldValue::Word(u32::from_le_bytes(bytes)),
        }
    }
}

/// A typed field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Gallons(f32),
    Count(i32),
    Word(u32),
}

impl FieldValue {
    pub fn to_le_bytes(self) -> [u8; 4] {
        match self {
            Self::Gallons(v) => v.to_le_bytes(),
            Self::Count(v) => v.to_le_bytes(),
            Self::Word(v) => v.to_le_bytes(),
        }
    }

    pub fn as_gallons(self) -> f32 {
        match self {
            Self::Gallons(v) => v,
            _ => 0.0,
        }
    }

    pub fn as_count(self) -> i32 {
        match self {
            Self::Count(v) => v,
            _ => 0,
        }
    }

    pub fn as_word(self) -> u32 {
        match self {
            Self::Word(v) => v,
            _ => 0,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Whole-record image
// ───────────────────────────────────────────────────────────────

/// Decoded contents of a valid record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PersistedRecord {
    pub lifetime_gallons: f32,
    pub daily_gallons: f32,
    pub flow_events_today: i32,
    pub hours_elapsed: i32,
    pub watchdog_reset_count: i32,
    pub daily_reset_epoch: u32,
}

impl PersistedRecord {
    /// Encode with the current guard.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut img = [0u8; RECORD_SIZE];
        let mut put = |field: PersistedField, bytes: [u8; 4]| {
            let o = field.offset();
            img[o..o + 4].copy_from_slice(&bytes);
        };
        put(PersistedField::Magic, STORAGE_MAGIC.to_le_bytes());
        put(PersistedField::Version, STORAGE_VERSION.to_le_bytes());
        put(PersistedField::LifetimeGallons, self.lifetime_gallons.to_le_bytes());
        put(PersistedField::DailyGallons, self.daily_gallons.to_le_bytes());
        put(PersistedField::FlowEventsToday, self.flow_events_today.to_le_bytes());
        put(PersistedField::HoursElapsed, self.hours_elapsed.to_le_bytes());
        put(
            PersistedField::WatchdogResetCount,
            self.watchdog_reset_count.to_le_bytes(),
        );
        put(PersistedField::DailyResetEpoch, self.daily_reset_epoch.to_le_bytes());
        img
    }

    /// Decode an image.  Returns `None` unless the guard matches.
    pub fn decode(img: &[u8]) -> Option<Self> {
        if img.len() < RECORD_SIZE || !guard_matches(img) {
            return None;
        }
        let get = |field: PersistedField| field.decode(word_at(img, field.offset()));
        Some(Self {
            lifetime_gallons: get(PersistedField::LifetimeGallons).as_gallons(),
            daily_gallons: get(PersistedField::DailyGallons).as_gallons(),
            flow_events_today: get(PersistedField::FlowEventsToday).as_count(),
            hours_elapsed: get(PersistedField::HoursElapsed).as_count(),
            watchdog_reset_count: get(PersistedField::WatchdogResetCount).as_count(),
            daily_reset_epoch: get(PersistedField::DailyResetEpoch).as_word(),
        })
    }
}

fn word_at(img: &[u8], offset: usize) -> [u8; 4] {
    let mut w = [0u8; 4];
    w.copy_from_slice(&img[offset..offset + 4]);
    w
}

fn check_writable(field: PersistedField, value: FieldValue) -> Result<(), StorageError> {
    if field.is_guard() {
        return Err(StorageError::GuardField);
    }
    if core::mem::discriminant(&value) != core::mem::discriminant(&field.zero()) {
        return Err(StorageError::TypeMismatch {
            offset: field.offset(),
        });
    }
    Ok(())
}

/// Whether the first eight bytes hold the expected magic and version.
pub fn guard_matches(img: &[u8]) -> bool {
    img.len() >= 8
        && u32::from_le_bytes(word_at(img, PersistedField::Magic.offset())) == STORAGE_MAGIC
        && u32::from_le_bytes(word_at(img, PersistedField::Version.offset())) == STORAGE_VERSION
}

// ───────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────

/// Outcome of [`PersistentStore::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreInit {
    /// The guard matched; stored values are trusted.
    Loaded,
    /// First boot or incompatible contents; every field was zeroed.
    Reinitialized,
}

pub struct PersistentStore<N: NvmPort> {
    nvm: N,
}

impl<N: NvmPort> PersistentStore<N> {
    pub fn new(nvm: N) -> Self {
        Self { nvm }
    }

    /// Check the guard, reinitialising the record if it does not match.
    pub fn begin(&mut self) -> Result<StoreInit, StorageError> {
        let mut guard = [0u8; 8];
        self.nvm.read(0, &mut guard)?;
        if guard_matches(&guard) {
            info!("store: record valid (version {})", STORAGE_VERSION);
            return Ok(StoreInit::Loaded);
        }

        warn!(
            "store: guard mismatch (magic {:#010x}, version {}), reinitialising",
            u32::from_le_bytes(word_at(&guard, 0)),
            u32::from_le_bytes(word_at(&guard, 4)),
        );
        self.reinitialize()?;
        Ok(StoreInit::Reinitialized)
    }

    /// Invalidate the guard and rewrite every field to zero.
    pub fn factory_reset(&mut self) -> Result<(), StorageError> {
        warn!("store: factory reset");
        self.nvm.write(PersistedField::Magic.offset(), &0u32.to_le_bytes())?;
        self.nvm.commit()?;
        self.reinitialize()
    }

    fn reinitialize(&mut self) -> Result<(), StorageError> {
        for field in PersistedField::DATA {
            self.nvm.write(field.offset(), &field.zero().to_le_bytes())?;
        }
        self.nvm.commit()?;
        self.nvm
            .write(PersistedField::Version.offset(), &STORAGE_VERSION.to_le_bytes())?;
        self.nvm
            .write(PersistedField::Magic.offset(), &STORAGE_MAGIC.to_le_bytes())?;
        self.nvm.commit()
    }

    /// Raw stored value of one field.
    pub fn load(&self, field: PersistedField) -> Result<FieldValue, StorageError> {
        let mut buf = [0u8; 4];
        self.nvm.read(field.offset(), &mut buf)?;
        Ok(field.decode(buf))
    }

    /// Write one data field durably.
    ///
    /// The value must have the field's type; guard fields are refused.
    pub fn save(&mut self, field: PersistedField, value: FieldValue) -> Result<(), StorageError> {
        check_writable(field, value)?;
        self.nvm.write(field.offset(), &value.to_le_bytes())?;
        self.nvm.commit()
    }

    /// Write several related fields in a single durable commit.
    ///
    /// Nothing is staged unless every entry passes the [`save`](Self::save)
    /// checks.
    pub fn save_group(&mut self, fields: &[(PersistedField, FieldValue)]) -> Result<(), StorageError> {
        for (field, value) in fields {
            check_writable(*field, *value)?;
        }
        for (field, value) in fields {
            self.nvm.write(field.offset(), &value.to_le_bytes())?;
        }
        self.nvm.commit()
    }

    /// Read the whole record.  `None` if the guard does not match.
    pub fn snapshot(&self) -> Result<Option<PersistedRecord>, StorageError> {
        let mut img = [0u8; RECORD_SIZE];
        self.nvm.read(0, &mut img)?;
        Ok(PersistedRecord::decode(&img))
    }

    // ── Typed accessors ──────────────────────────────────────

    pub fn lifetime_gallons(&self) -> Result<f32, StorageError> {
        Ok(self.load(PersistedField::LifetimeGallons)?.as_gallons())
    }

    pub fn daily_gallons(&self) -> Result<f32, StorageError> {
        Ok(self.load(PersistedField::DailyGallons)?.as_gallons())
    }

    pub fn flow_events_today(&self) -> Result<i32, StorageError> {
        Ok(self.load(PersistedField::FlowEventsToday)?.as_count())
    }

    pub fn hours_elapsed(&self) -> Result<i32, StorageError> {
        Ok(self.load(PersistedField::HoursElapsed)?.as_count())
    }

    pub fn watchdog_reset_count(&self) -> Result<i32, StorageError> {
        Ok(self.load(PersistedField::WatchdogResetCount)?.as_count())
    }

    pub fn set_watchdog_reset_count(&mut self, count: i32) -> Result<(), StorageError> {
        self.save(PersistedField::WatchdogResetCount, FieldValue::Count(count))
    }

    pub fn daily_reset_epoch(&self) -> Result<u32, StorageError> {
        Ok(self.load(PersistedField::DailyResetEpoch)?.as_word())
    }

    pub fn set_daily_reset_epoch(&mut self, epoch: u32) -> Result<(), StorageError> {
        self.save(PersistedField::DailyResetEpoch, FieldValue::Word(epoch))
    }

    pub fn backend(&self) -> &N {
        &self.nvm
    }

    pub fn backend_mut(&mut self) -> &mut N {
        &mut self.nvm
    }

    pub fn into_backend(self) -> N {
        self.nvm
    }
}
