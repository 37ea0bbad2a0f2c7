/// Runtime configuration for edit operations.
#[derive(Clone, Debug, Default)]
pub struct EditConfig {
    /// Suffix for synthetic upload audit fields. When set, every attachment
    /// write also records the acting principal in `<field>__<suffix>`; the
    /// field is persisted but stripped from responses.
    pub upload_user_field_suffix: Option<String>,
}

impl EditConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upload_user_field_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.upload_user_field_suffix = Some(suffix.into());
        self
    }

    /// Audit field name for an attachment field, if a suffix is configured.
    pub(crate) fn audit_field(&self, field: &str) -> Option<String> {
        self.upload_user_field_suffix
            .as_deref()
            .map(|suffix| format!("{}__{}", field, suffix))
    }
}
