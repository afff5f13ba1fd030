//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`NvmPort`] (the persisted totals record) and
//! [`ConfigPort`] (the postcard-encoded [`FlowConfig`] blob).
//!
//! The record is kept in a 32-byte shadow image.  Writes land in the
//! shadow; [`NvmPort::commit`] stores the whole image as one NVS blob, and
//! ESP-IDF guarantees a blob write is all-or-nothing across power loss.
//! The simulation backend models the same staged/durable split so tests can
//! cut power between a write and its commit.

use crate::app::ports::{ConfigError, ConfigPort, NvmPort, StorageError};
use crate::config::FlowConfig;
use crate::storage::RECORD_SIZE;
use log::info;

#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
const NAMESPACE: &[u8] = b"flowmeter\0";
#[cfg(target_os = "espidf")]
const CONFIG_KEY: &[u8] = b"flowcfg\0";
#[cfg(target_os = "espidf")]
const RECORD_KEY: &[u8] = b"record\0";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 512;

/// Contents of erased flash.
const ERASED: [u8; RECORD_SIZE] = [0xFF; RECORD_SIZE];

pub struct NvsAdapter {
    /// Record image including uncommitted writes.
    staged: [u8; RECORD_SIZE],
    /// Record image as of the last commit.
    #[cfg(not(target_os = "espidf"))]
    durable: [u8; RECORD_SIZE],
    #[cfg(not(target_os = "espidf"))]
    config_blob: std::cell::RefCell<Option<Vec<u8>>>,
    #[cfg(not(target_os = "espidf"))]
    fail_commits: bool,
    #[cfg(not(target_os = "espidf"))]
    commits: usize,
}

impl NvsAdapter {
    /// Create a new NvsAdapter, initialise NVS flash and load the record
    /// image.
    ///
    /// On a version mismatch or full partition the NVS partition is erased
    /// and re-initialised; the record then reads as erased flash and the
    /// store's guard check reinitialises it.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }

            let mut staged = ERASED;
            let loaded = Self::with_nvs_handle(false, |handle| {
                let mut size = RECORD_SIZE;
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        RECORD_KEY.as_ptr() as *const _,
                        staged.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match loaded {
                Ok(RECORD_SIZE) => info!("NvsAdapter: record image loaded"),
                Ok(n) => {
                    warn!("NvsAdapter: record blob has {} bytes, treating as erased", n);
                    staged = ERASED;
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => info!("NvsAdapter: no record yet"),
                Err(e) => {
                    warn!("NvsAdapter: record read error {}, treating as erased", e);
                    staged = ERASED;
                }
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
            Ok(Self { staged })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NvsAdapter: simulation backend");
            Ok(Self::with_record_image(ERASED))
        }
    }

    /// Open the flowmeter namespace, execute a closure with the handle,
    /// then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(NAMESPACE.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    fn range(offset: usize, len: usize) -> Result<core::ops::Range<usize>, StorageError> {
        match offset.checked_add(len) {
            Some(end) if end <= RECORD_SIZE => Ok(offset..end),
            _ => Err(StorageError::OutOfBounds { offset, len }),
        }
    }
}

// ── Simulation helpers ─────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl NvsAdapter {
    /// Simulated flash whose durable record holds `image`.
    pub fn with_record_image(image: [u8; RECORD_SIZE]) -> Self {
        Self {
            staged: image,
            durable: image,
            config_blob: std::cell::RefCell::new(None),
            fail_commits: false,
            commits: 0,
        }
    }

    /// Drop every uncommitted write, as a reset would.
    pub fn simulate_power_loss(mut self) -> Self {
        self.staged = self.durable;
        self
    }

    /// Make subsequent commits fail with [`StorageError::IoError`].
    pub fn set_fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    /// The committed record image.
    pub fn durable_image(&self) -> [u8; RECORD_SIZE] {
        self.durable
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

impl NvmPort for NvsAdapter {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let r = Self::range(offset, buf.len())?;
        buf.copy_from_slice(&self.staged[r]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let r = Self::range(offset, data.len())?;
        self.staged[r].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            if self.fail_commits {
                return Err(StorageError::IoError);
            }
            self.durable = self.staged;
            self.commits += 1;
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let image = self.staged;
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        RECORD_KEY.as_ptr() as *const _,
                        image.as_ptr() as *const _,
                        image.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                warn!("NvsAdapter: record commit error {}", e);
                StorageError::IoError
            })
        }
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<FlowConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            if let Some(bytes) = self.config_blob.borrow().as_deref() {
                let cfg: FlowConfig =
                    postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config from store");
                Ok(cfg)
            } else {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(FlowConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let mut size: usize = 0;

                // First call: get size
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        CONFIG_KEY.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        CONFIG_KEY.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }

                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg: FlowConfig =
                        postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(FlowConfig::default())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}, using defaults", e);
                    Ok(FlowConfig::default())
                }
            }
        }
    }

    fn save(&self, config: &FlowConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            *self.config_blob.borrow_mut() = Some(bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        CONFIG_KEY.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}
