use embedded_storage::{ReadStorage, Storage};
use esp_storage::{FlashStorage, FlashStorageError};
use log::warn;

use crate::constants::{SETTINGS_FLASH_OFFSET, SETTINGS_MAX_SIZE};
use crate::settings::SettingsBackend;

/// Marks a written settings record. Erased flash reads back as all ones.
const RECORD_MAGIC: u32 = 0x424F_494C;
const HEADER_LEN: usize = 8;

/// Settings record in a reserved flash sector: magic, length, then the text.
pub struct FlashBackend<'d> {
    flash: FlashStorage<'d>,
}

impl<'d> FlashBackend<'d> {
    pub fn new(flash: FlashStorage<'d>) -> Self {
        Self { flash }
    }
}

impl SettingsBackend for FlashBackend<'_> {
    type Error = FlashStorageError;

    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        let mut header = [0u8; HEADER_LEN];
        self.flash.read(SETTINGS_FLASH_OFFSET, &mut header)?;

        let (magic, len) = header.split_at(4);
        let magic = u32::from_le_bytes([magic[0], magic[1], magic[2], magic[3]]);
        let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;

        if magic != RECORD_MAGIC {
            return Ok(None);
        }
        if len > SETTINGS_MAX_SIZE || len > buf.len() {
            warn!("Settings record claims {} bytes, ignoring it", len);
            return Ok(None);
        }

        self.flash
            .read(SETTINGS_FLASH_OFFSET + HEADER_LEN as u32, &mut buf[..len])?;
        Ok(Some(len))
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if data.len() > SETTINGS_MAX_SIZE {
            return Err(FlashStorageError::OutOfBounds);
        }

        let mut record = [0u8; HEADER_LEN + SETTINGS_MAX_SIZE];
        record[..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        record[4..HEADER_LEN].copy_from_slice(&(data.len() as u32).to_le_bytes());
        record[HEADER_LEN..HEADER_LEN + data.len()].copy_from_slice(data);

        // pad to a word boundary
        let len = (HEADER_LEN + data.len()).next_multiple_of(4);
        self.flash.write(SETTINGS_FLASH_OFFSET, &record[..len])
    }
}
