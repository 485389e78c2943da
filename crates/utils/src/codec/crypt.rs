/*
 * Copyright (c) 2023 Stalwart Labs Ltd.
 *
 * This file is part of the Stalwart Mail Warmer.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 * in the LICENSE file at the top-level directory of this distribution.
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 * You can be released from the requirements of the AGPLv3 license by
 * purchasing a commercial license. Please contact licensing@stalw.art
 * for more details.
*/

use std::fmt::Display;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use super::{hex_decode, hex_encode};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;

// Symmetric codec for credentials at rest, stored as "<ivHex>:<cipherHex>".
#[derive(Clone)]
pub struct SymmetricKey {
    key: [u8; 32],
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    InvalidKey,
    InvalidPayload,
    DecryptionFailed,
}

impl SymmetricKey {
    pub fn from_hex(secret: &str) -> Result<Self, Error> {
        let bytes = hex_decode(secret.trim()).ok_or(Error::InvalidKey)?;
        if bytes.len() != 32 {
            return Err(Error::InvalidKey);
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(SymmetricKey { key })
    }

    pub fn seal(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        format!("{}:{}", hex_encode(&iv), hex_encode(&ciphertext))
    }

    pub fn open(&self, sealed: &str) -> Result<String, Error> {
        let (iv_hex, cipher_hex) = sealed.split_once(':').ok_or(Error::InvalidPayload)?;
        let iv = hex_decode(iv_hex).ok_or(Error::InvalidPayload)?;
        let ciphertext = hex_decode(cipher_hex).ok_or(Error::InvalidPayload)?;
        if iv.len() != IV_LEN || ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(Error::InvalidPayload);
        }
        let mut iv_arr = [0u8; IV_LEN];
        iv_arr.copy_from_slice(&iv);
        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv_arr.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| Error::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidKey => f.write_str("Invalid encryption key, expected 32 hex bytes"),
            Error::InvalidPayload => f.write_str("Invalid encrypted payload"),
            Error::DecryptionFailed => f.write_str("Decryption failed"),
        }
    }
}
