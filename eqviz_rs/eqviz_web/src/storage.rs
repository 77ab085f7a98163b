use eqviz::{CredentialStore, EqvizError, Result, CREDENTIAL_KEY};
use wasm_bindgen::JsValue;
use web_sys::Storage;

/// Credential kept in browser `localStorage` under [`CREDENTIAL_KEY`].
///
/// The `Storage` handle is looked up on every call since it cannot be held
/// across threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalStorageStore;

fn local_storage() -> Result<Storage> {
    web_sys::window()
        .ok_or_else(|| EqvizError::Storage("no browser window".into()))?
        .local_storage()
        .map_err(js_error)?
        .ok_or_else(|| EqvizError::Storage("localStorage is unavailable".into()))
}

fn js_error(err: JsValue) -> EqvizError {
    EqvizError::Storage(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}

impl CredentialStore for LocalStorageStore {
    fn load(&self) -> Result<Option<String>> {
        let token = local_storage()?.get_item(CREDENTIAL_KEY).map_err(js_error)?;
        Ok(token.filter(|t| !t.is_empty()))
    }

    fn save(&self, token: &str) -> Result<()> {
        local_storage()?
            .set_item(CREDENTIAL_KEY, token)
            .map_err(js_error)
    }

    fn clear(&self) -> Result<()> {
        local_storage()?.remove_item(CREDENTIAL_KEY).map_err(js_error)
    }
}
