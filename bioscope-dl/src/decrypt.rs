use crate::{
    Error, Result,
    keys::{KeyStore, parse_iv},
    playlist::{Key, Segment},
};
use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use bytes::Bytes;
use std::sync::Arc;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const BLOCK_SIZE: usize = 16;

#[derive(Clone)]
pub struct Decrypter {
    keys: Arc<KeyStore>,
}

impl Decrypter {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Decrypts `data` if the segment is encrypted, otherwise returns it as is.
    pub async fn process(&self, data: Bytes, segment: &Segment) -> Result<Vec<u8>> {
        match &segment.key {
            Some(key) => self.decrypt(data, key, segment.sequence).await,
            None => Ok(data.to_vec()),
        }
    }

    /// AES-CBC decrypts a whole segment. No padding is removed, so the
    /// plaintext is exactly as long as the ciphertext.
    pub async fn decrypt(&self, data: Bytes, key: &Key, sequence: u64) -> Result<Vec<u8>> {
        let iv = match &key.iv {
            Some(iv) => parse_iv(iv)?,
            None => sequence_iv(sequence).to_vec(),
        };
        let key = self.keys.resolve(&key.uri).await?;

        let mut data = data.to_vec();
        cbc_decrypt(&key, &iv, &mut data)?;
        Ok(data)
    }
}

/// Default iv of a segment whose key has no explicit one.
pub fn sequence_iv(sequence: u64) -> [u8; 16] {
    (sequence as u128).to_be_bytes()
}

pub fn cbc_decrypt(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::UnalignedCiphertext(data.len()));
    }

    if iv.len() != BLOCK_SIZE {
        return Err(Error::InvalidIvLength(iv.len()));
    }

    match key.len() {
        16 => decrypt_in_place::<Aes128CbcDec>(key, iv, data),
        24 => decrypt_in_place::<Aes192CbcDec>(key, iv, data),
        32 => decrypt_in_place::<Aes256CbcDec>(key, iv, data),
        x => Err(Error::InvalidKeyLength(x)),
    }
}

fn decrypt_in_place<D>(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()>
where
    D: KeyIvInit + BlockDecryptMut,
{
    let len = data.len();
    D::new_from_slices(key, iv)
        .map_err(|_| Error::InvalidKeyLength(key.len()))?
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| Error::UnalignedCiphertext(len))?;
    Ok(())
}
