use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use bytesize::ByteSize;
use chrono::Utc;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::config::AzureStorageConfig;
use crate::constants::{AZURE_API_VERSION, DEFAULT_CONNECT_TIMEOUT};
use crate::storage::base::Storage;

// 单页最多返回的对象数，服务端上限为5000
const LIST_PAGE_SIZE: u32 = 5000;
// 防止服务端返回的NextMarker不前进导致死循环
const MAX_LIST_PAGES: usize = 1000;

#[derive(Debug, Deserialize)]
struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    blobs: BlobList,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    blob: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
}

/// 解析 List Blobs 的XML响应，返回对象名和下一页的marker
fn parse_list_response(xml: &str) -> Result<(Vec<String>, Option<String>)> {
    let results: EnumerationResults = quick_xml::de::from_str(xml)
        .map_err(|e| anyhow!("无法解析List Blobs响应: {}", e))?;

    let names = results.blobs.blob.into_iter().map(|b| b.name).collect();
    let marker = results
        .next_marker
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());

    Ok((names, marker))
}

/// Azure Blob Storage REST 客户端
///
/// 认证方式只消费已签发的凭据：SAS查询串或OAuth bearer令牌，二者都未配置时按匿名访问。
pub struct AzureBlobStorage {
    client: Client,
    opts: AzureStorageConfig,
}

impl AzureBlobStorage {
    pub fn new(opts: AzureStorageConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(*DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        // 提前校验端点，避免每次请求才失败
        Url::parse(&opts.endpoint).map_err(|e| anyhow!("无效的存储端点 {}: {}", opts.endpoint, e))?;

        debug!(
            "Azure Blob配置: 端点={}, 容器={}, SAS={}, Bearer={}",
            opts.endpoint,
            opts.container,
            opts.sas_token.is_some(),
            opts.bearer_token.is_some()
        );

        Ok(Self { client, opts })
    }

    fn container_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.opts.endpoint)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("存储端点不能作为基础URL: {}", self.opts.endpoint))?
            .pop_if_empty()
            .push(&self.opts.container);
        Ok(url)
    }

    fn list_url(&self, prefix: &str, marker: Option<&str>) -> Result<Url> {
        let mut url = self.container_url()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("restype", "container")
                .append_pair("comp", "list")
                .append_pair("prefix", prefix)
                .append_pair("maxresults", &LIST_PAGE_SIZE.to_string());
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }
        self.append_sas(&mut url);
        Ok(url)
    }

    fn blob_url(&self, name: &str) -> Result<Url> {
        let mut url = self.container_url()?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("存储端点不能作为基础URL: {}", self.opts.endpoint))?
            .extend(name.split('/'));
        self.append_sas(&mut url);
        Ok(url)
    }

    fn append_sas(&self, url: &mut Url) {
        if let Some(sas) = &self.opts.sas_token {
            let mut query = url.query_pairs_mut();
            for (k, v) in url::form_urlencoded::parse(sas.as_bytes()) {
                query.append_pair(&k, &v);
            }
        }
    }

    fn request(&self, url: Url) -> RequestBuilder {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let builder = self
            .client
            .get(url)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("x-ms-date", date);

        match &self.opts.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, url: Url, what: &str) -> Result<reqwest::Response> {
        let res = self.request(url).send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let error_code = res
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        Err(anyhow!("{}失败: {} {}", what, status, error_code))
    }
}

#[async_trait]
impl Storage for AzureBlobStorage {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        for page in 0..MAX_LIST_PAGES {
            let url = self.list_url(prefix, marker.as_deref())?;
            let body = self.send(url, "列举对象").await?.text().await?;
            let (page_names, next) = parse_list_response(&body)?;

            debug!("列举第{}页: {} 个对象", page + 1, page_names.len());
            names.extend(page_names);

            match next {
                Some(next) if Some(&next) != marker.as_ref() => marker = Some(next),
                Some(_) => return Err(anyhow!("List Blobs返回了重复的NextMarker")),
                None => return Ok(names),
            }
        }

        Err(anyhow!("列举对象超过{}页，已放弃", MAX_LIST_PAGES))
    }

    async fn get_object(&self, name: &str) -> Result<Bytes> {
        let url = self.blob_url(name)?;
        let bytes = self.send(url, "下载对象").await?.bytes().await?;
        debug!("已下载 {} ({})", name, ByteSize(bytes.len() as u64));
        Ok(bytes)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.opts.endpoint, self.opts.container)
    }
}
