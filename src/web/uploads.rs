use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use tokio::{fs::File, io::AsyncWriteExt};

pub type UploadResult<T> = Result<T, UploadError>;

/// Error returned when validating or persisting an uploaded essay.
#[derive(Debug)]
pub struct UploadError {
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UploadError {}

/// Expectations for the single file field of an upload form.
#[derive(Debug, Clone, Copy)]
pub struct FileFieldConfig<'a> {
    pub field_name: &'a str,
    pub allowed_extensions: &'a [&'a str],
    pub prefix: &'a str,
}

/// Metadata describing a stored upload on disk.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub original_name: String,
    pub stored_path: PathBuf,
    pub extension: String,
    pub file_size: u64,
}

/// Stores the first file sent under `config.field_name` into `dest_dir`.
///
/// Other fields are ignored. The caller owns `dest_dir` and removes it once
/// the file has been read.
pub async fn receive_single_file(
    mut multipart: Multipart,
    dest_dir: &Path,
    config: FileFieldConfig<'_>,
) -> UploadResult<SavedFile> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|err| UploadError::new(format!("无法创建上传目录: {err}")))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::new(format!("解析上传表单失败: {err}")))?
    {
        if field.name() != Some(config.field_name) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let extension = file_extension(&file_name);
        if !config
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
        {
            return Err(UploadError::new(format!(
                "不支持的文件类型，请上传 {} 文件。",
                config.allowed_extensions.join(" / ")
            )));
        }

        let stored_path = dest_dir.join(stored_name(config.prefix, &file_name, &extension));
        let mut file = File::create(&stored_path)
            .await
            .map_err(|err| UploadError::new(format!("保存文件失败: {err}")))?;

        let mut total_bytes: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| UploadError::new(format!("读取上传数据失败: {err}")))?
        {
            total_bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|err| UploadError::new(format!("写入文件失败: {err}")))?;
        }
        file.flush()
            .await
            .map_err(|err| UploadError::new(format!("刷新文件失败: {err}")))?;

        if total_bytes == 0 {
            return Err(UploadError::new("上传的文件为空。"));
        }

        return Ok(SavedFile {
            original_name: file_name,
            stored_path,
            extension,
            file_size: total_bytes,
        });
    }

    Err(UploadError::new("请上传作文文件。"))
}

fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn stored_name(prefix: &str, file_name: &str, extension: &str) -> String {
    let sanitized = sanitize_filename::sanitize(file_name);
    if sanitized.is_empty() || sanitized.starts_with('.') {
        format!("{prefix}upload.{extension}")
    } else {
        format!("{prefix}{sanitized}")
    }
}
