use serde::Deserialize;

use crate::uploads::TempUpload;

/// Registration input as it arrives from the multipart form.
/// Text fields stay optional here so missing and blank are reported alike.
#[derive(Debug, Default)]
pub struct RegisterForm {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<TempUpload>,
    pub cover_image: Option<TempUpload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}
