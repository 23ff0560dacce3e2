//! Operator prompt for the authorization code

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Stdin};
use tokio::sync::Mutex;

use super::traits::AuthCodeProvider;
use crate::transfer::error::AuthExchangeError;

/// Prints the login URL and reads the pasted code, one line per login
///
/// The reader is kept across logins so input typed ahead of a later prompt
/// is not lost.
pub struct PromptCodeProvider<R> {
    reader: Mutex<BufReader<R>>,
}

pub type StdinCodeProvider = PromptCodeProvider<Stdin>;

impl<R: AsyncRead + Unpin + Send> PromptCodeProvider<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
        }
    }
}

impl PromptCodeProvider<Stdin> {
    pub fn new() -> Self {
        Self::from_reader(tokio::io::stdin())
    }
}

impl Default for PromptCodeProvider<Stdin> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> AuthCodeProvider for PromptCodeProvider<R> {
    async fn provide_code(&self, authorize_url: &str) -> Result<String, AuthExchangeError> {
        println!("Please go to this URL and login:\n\n{}\n", authorize_url);
        println!("Please enter the code here: ");

        let mut line = String::new();
        self.reader.lock().await.read_line(&mut line).await?;

        let code = line.trim();
        if code.is_empty() {
            return Err(AuthExchangeError::EmptyCode);
        }
        Ok(code.to_string())
    }
}
