use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::storage::base::Storage;

/// 以本地目录模拟容器: `<root>/<server_id>/<timestamp>.json`
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(anyhow!("非法的对象名: {}", name));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(anyhow!("存储目录不存在: {}", self.root.display()));
        }

        // 只从前缀中的目录部分开始遍历
        let start = match prefix.rfind('/') {
            Some(idx) => self.object_path(&prefix[..idx])?,
            None => self.root.clone(),
        };
        if !start.is_dir() {
            debug!("前缀目录不存在: {}", start.display());
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut queue = vec![start];

        while let Some(dir) = queue.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    error!("读取目录失败: {} - {}", dir.display(), e);
                    continue;
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    queue.push(path);
                    continue;
                }

                let relative = path.strip_prefix(&self.root).unwrap_or(&path);
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if name.starts_with(prefix) {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn get_object(&self, name: &str) -> Result<Bytes> {
        let path = self.object_path(name)?;
        let content = fs::read(&path)
            .await
            .map_err(|e| anyhow!("读取文件失败: {} - {}", path.display(), e))?;
        Ok(Bytes::from(content))
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn lists_only_names_under_prefix() {
        let dir = tempdir().unwrap();
        write(dir.path(), "server-01/10.json", "{}").await;
        write(dir.path(), "server-01/30.json", "{}").await;
        write(dir.path(), "server-01/old/5.json", "{}").await;
        write(dir.path(), "server-02/99.json", "{}").await;

        let storage = FileStorage::new(dir.path().to_path_buf());
        let names = storage.list_objects("server-01/").await.unwrap();
        assert_eq!(
            names,
            vec!["server-01/10.json", "server-01/30.json", "server-01/old/5.json"]
        );
    }

    #[tokio::test]
    async fn missing_prefix_directory_lists_nothing() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        assert!(storage.list_objects("nobody/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("absent"));
        assert!(storage.list_objects("server-01/").await.is_err());
    }

    #[tokio::test]
    async fn reads_objects_and_rejects_traversal() {
        let dir = tempdir().unwrap();
        write(dir.path(), "server-01/10.json", r#"{"users":{}}"#).await;

        let storage = FileStorage::new(dir.path().to_path_buf());
        let bytes = storage.get_object("server-01/10.json").await.unwrap();
        assert_eq!(&bytes[..], br#"{"users":{}}"#);

        assert!(storage.get_object("../etc/passwd").await.is_err());
        assert!(storage.get_object("server-01/missing.json").await.is_err());
    }
}
