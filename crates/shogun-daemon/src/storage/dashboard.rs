//! Serialised read-modify-write of the shared document.

use shogun_core::Document;

use super::store::{Store, StoreError, read_optional, write_atomic};

impl Store {
    /// Apply `edit` to the parsed dashboard under the document lock and
    /// write it back when the closure reports a change.
    ///
    /// A missing dashboard is edited as an empty document, in which every
    /// section lookup is a no-op.
    pub async fn update_shared_document<F>(&self, edit: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Document) -> bool,
    {
        let _guard = self.document_lock.lock().await;
        let path = self.document_path();
        let text = read_optional(&path).await?.unwrap_or_default();
        let mut document = Document::parse(&text);
        if !edit(&mut document) {
            return Ok(false);
        }
        write_atomic(&path, &document.render()).await?;
        Ok(true)
    }
}
