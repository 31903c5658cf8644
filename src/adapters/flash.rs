//! Secondary firmware slot and boot manager adapter.
//!
//! Implements [`SlotPort`] and [`BootPort`].
//!
//! - **`target_os = "espidf"`**: the `esp-ota` crate for writing and
//!   activating the next OTA partition; the confirm state and the erase
//!   of the idle slot go through the raw `esp_ota_*` / `esp_partition_*`
//!   calls it does not wrap.
//! - **all other targets**: an in-memory slot with a simulated reboot,
//!   used by host tests.

#[cfg(target_os = "espidf")]
use log::{info, warn};

use crate::app::ports::{BootPort, SlotPort};
use crate::ota::OtaError;

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct FlashSlot {
    update: Option<esp_ota::OtaUpdate>,
    completed: Option<esp_ota::CompletedOtaUpdate>,
}

#[cfg(target_os = "espidf")]
impl FlashSlot {
    pub fn new() -> Self {
        Self {
            update: None,
            completed: None,
        }
    }

    fn next_partition() -> Option<&'static esp_idf_svc::sys::esp_partition_t> {
        // SAFETY: returns a pointer into the static partition table or null.
        unsafe { esp_idf_svc::sys::esp_ota_get_next_update_partition(core::ptr::null()).as_ref() }
    }
}

#[cfg(target_os = "espidf")]
impl Default for FlashSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl SlotPort for FlashSlot {
    fn capacity(&self) -> u32 {
        Self::next_partition().map_or(0, |p| p.size)
    }

    fn begin(&mut self) -> Result<(), OtaError> {
        self.completed = None;
        let update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("esp-ota begin failed: {:?}", e);
            OtaError::BeginFailed
        })?;
        self.update = Some(update);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), OtaError> {
        let update = self.update.as_mut().ok_or(OtaError::NotReceiving)?;
        update.write(data).map_err(|e| {
            warn!("esp-ota write failed: {:?}", e);
            OtaError::FlashWrite
        })
    }

    fn finish(&mut self) -> Result<(), OtaError> {
        let update = self.update.take().ok_or(OtaError::NotReceiving)?;
        let completed = update.finalize().map_err(|e| {
            warn!("esp-ota finalize failed: {:?}", e);
            OtaError::FlashWrite
        })?;
        self.completed = Some(completed);
        Ok(())
    }

    fn abort(&mut self) {
        // esp-ota aborts the partition write when OtaUpdate is dropped
        self.update = None;
        self.completed = None;
    }
}

#[cfg(target_os = "espidf")]
impl BootPort for FlashSlot {
    fn mark_test_boot(&mut self) -> Result<(), OtaError> {
        let completed = self.completed.as_mut().ok_or(OtaError::MarkFailed)?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("esp-ota set_as_boot_partition failed: {:?}", e);
            OtaError::MarkFailed
        })
    }

    fn is_running_confirmed(&self) -> Result<bool, OtaError> {
        use esp_idf_svc::sys::{
            ESP_OK, esp_ota_get_running_partition, esp_ota_get_state_partition,
            esp_ota_img_states_t, esp_ota_img_states_t_ESP_OTA_IMG_PENDING_VERIFY,
        };

        let mut state: esp_ota_img_states_t = 0;
        // SAFETY: the running partition pointer is static; `state` outlives the call.
        let err = unsafe { esp_ota_get_state_partition(esp_ota_get_running_partition(), &mut state) };
        if err != ESP_OK {
            // Factory images carry no OTA state and never roll back.
            return Ok(true);
        }
        Ok(state != esp_ota_img_states_t_ESP_OTA_IMG_PENDING_VERIFY)
    }

    fn confirm_running(&mut self) -> Result<(), OtaError> {
        esp_ota::mark_app_valid().map_err(|e| {
            warn!("esp-ota mark_app_valid failed: {:?}", e);
            OtaError::ConfirmFailed
        })
    }

    fn erase_secondary(&mut self) -> Result<(), OtaError> {
        let part = Self::next_partition().ok_or(OtaError::EraseFailed)?;
        // SAFETY: `part` comes from the static partition table; the range is the whole partition.
        let err = unsafe { esp_idf_svc::sys::esp_partition_erase_range(part, 0, part.size as usize) };
        if err != esp_idf_svc::sys::ESP_OK {
            warn!("erase of idle slot failed: {}", err);
            return Err(OtaError::EraseFailed);
        }
        info!("FOTA | idle slot erased");
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct FlashSlot {
    capacity: u32,
    writing: Option<Vec<u8>>,
    finished: Option<Vec<u8>>,
    boot_pending: Option<Vec<u8>>,
    running: Vec<u8>,
    running_confirmed: bool,
    confirms: u32,
    erases: u32,
    fail_writes: bool,
}

#[cfg(not(target_os = "espidf"))]
impl FlashSlot {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            running_confirmed: true,
            ..Self::default()
        }
    }

    /// Image that boots after [`reboot`](Self::reboot).
    pub fn boot_pending(&self) -> Option<&[u8]> {
        self.boot_pending.as_deref()
    }

    pub fn running(&self) -> &[u8] {
        &self.running
    }

    /// True while a partially written image is open.
    pub fn is_writing(&self) -> bool {
        self.writing.is_some()
    }

    pub fn confirms(&self) -> u32 {
        self.confirms
    }

    pub fn erases(&self) -> u32 {
        self.erases
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Simulated reset: a marked image boots on trial.
    pub fn reboot(&mut self) {
        if let Some(image) = self.boot_pending.take() {
            self.running = image;
            self.running_confirmed = false;
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl SlotPort for FlashSlot {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn begin(&mut self) -> Result<(), OtaError> {
        if self.writing.is_some() {
            return Err(OtaError::AlreadyInProgress);
        }
        self.finished = None;
        self.writing = Some(Vec::new());
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), OtaError> {
        if self.fail_writes {
            return Err(OtaError::FlashWrite);
        }
        let image = self.writing.as_mut().ok_or(OtaError::NotReceiving)?;
        if image.len() + data.len() > self.capacity as usize {
            return Err(OtaError::FlashWrite);
        }
        image.extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OtaError> {
        let image = self.writing.take().ok_or(OtaError::NotReceiving)?;
        self.finished = Some(image);
        Ok(())
    }

    fn abort(&mut self) {
        self.writing = None;
        self.finished = None;
    }
}

#[cfg(not(target_os = "espidf"))]
impl BootPort for FlashSlot {
    fn mark_test_boot(&mut self) -> Result<(), OtaError> {
        let image = self.finished.take().ok_or(OtaError::MarkFailed)?;
        self.boot_pending = Some(image);
        Ok(())
    }

    fn is_running_confirmed(&self) -> Result<bool, OtaError> {
        Ok(self.running_confirmed)
    }

    fn confirm_running(&mut self) -> Result<(), OtaError> {
        self.confirms += 1;
        self.running_confirmed = true;
        Ok(())
    }

    fn erase_secondary(&mut self) -> Result<(), OtaError> {
        self.erases += 1;
        Ok(())
    }
}
