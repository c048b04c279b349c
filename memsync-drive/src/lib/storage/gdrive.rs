use std::sync::Arc;

use bytes::Bytes;
use memsync::{FileId, RemoteConfig};

use super::RemoteFile;
use crate::oauth2::{GetToken, ServiceAccount};

pub use self::api::{About, Quota, User, UPLOAD_CHUNK_SZ};

const BASE_URL: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3";

#[derive(Clone)]
pub struct GoogleDrive<A> {
    client: reqwest::Client,
    auth: Arc<A>,
    base_url: String,
    upload_base_url: String,
    user_agent: String,
}

impl GoogleDrive<ServiceAccount> {
    /// Builds the Drive client from credentials. Makes no request.
    pub fn from_config(config: &RemoteConfig, client: reqwest::Client) -> memsync::Result<Self> {
        let auth = ServiceAccount::new(config.credentials.clone(), Some(client.clone()))?;
        log::info!(
            "Initializing Google Drive storage with service account {}",
            auth.client_email()
        );
        Ok(Self::new(auth, client))
    }
}

impl<A> GoogleDrive<A>
where
    A: GetToken,
{
    pub fn new(auth: A, client: reqwest::Client) -> Self {
        let user_agent = format!("memsync/{}", env!("CARGO_PKG_VERSION"));
        Self {
            client,
            auth: Arc::new(auth),
            base_url: BASE_URL.to_string(),
            upload_base_url: UPLOAD_BASE_URL.to_string(),
            user_agent,
        }
    }

    /// Points the client to another API endpoint than the public Google one
    pub fn with_base_urls(mut self, base_url: &str, upload_base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.upload_base_url = upload_base_url.trim_end_matches('/').to_string();
        self
    }

    /// Checks that the credentials are accepted and logs who we are connected as
    pub async fn check_access(&self) -> memsync::Result<About> {
        let about = self.about_get().await?;
        log::info!(
            "Access granted to Drive of {}{}",
            about.user.display_name,
            about
                .user
                .email_address
                .as_ref()
                .map(|em| format!(" <{em}>"))
                .unwrap_or_default(),
        );
        if let Some(usage) = about.storage_quota.describe_usage() {
            log::info!("Usage {usage}");
        }
        Ok(about)
    }
}

impl<A> super::FindFiles for GoogleDrive<A>
where
    A: GetToken,
{
    async fn find_files(
        &self,
        name: &str,
        folder: Option<&FileId>,
    ) -> memsync::Result<Vec<RemoteFile>> {
        let q = files_query(name, folder);
        log::trace!("searching files with q=\"{q}\"");

        let mut found = Vec::new();
        let mut next_page_token = None;
        loop {
            let file_list = self.files_list(q.clone(), next_page_token).await?;
            next_page_token = file_list.next_page_token;
            for f in file_list.files.unwrap_or_default() {
                // the query already excludes trashed files, this guards against stale listings
                if f.trashed == Some(true) {
                    continue;
                }
                found.push(map_file(f)?);
            }
            if next_page_token.is_none() {
                break;
            }
        }
        Ok(found)
    }
}

impl<A> super::CreateFile for GoogleDrive<A>
where
    A: GetToken,
{
    async fn create_file(
        &self,
        name: &str,
        folder: Option<&FileId>,
        data: Bytes,
    ) -> memsync::Result<RemoteFile> {
        let len = data.len();
        match folder {
            Some(folder) => log::info!("creating file {name} in folder {folder} ({len} bytes)"),
            None => log::info!("creating file {name} in root folder ({len} bytes)"),
        }
        let file = api::File {
            id: None,
            name: Some(name.to_string()),
            mime_type: Some(JSON_MIMETYPE.to_string()),
            parents: folder.map(|id| vec![id.clone()]),
            trashed: None,
        };
        let file = self
            .files_upload(reqwest::Method::POST, "/files", Some(&file), data)
            .await?;
        map_file(file)
    }
}

impl<A> super::UpdateFile for GoogleDrive<A>
where
    A: GetToken,
{
    async fn update_file(&self, id: &FileId, data: Bytes) -> memsync::Result<RemoteFile> {
        log::info!("updating file {id} ({} bytes)", data.len());
        let path = format!("/files/{id}");
        let file = self
            .files_upload(reqwest::Method::PATCH, &path, None, data)
            .await?;
        map_file(file)
    }
}

impl<A> super::Storage for GoogleDrive<A> where A: GetToken {}

const JSON_MIMETYPE: &str = "application/json";

/// Drive search query for non-trashed files named `name`, optionally in `folder`
fn files_query(name: &str, folder: Option<&FileId>) -> String {
    let mut q = format!("name = '{}' and trashed = false", escape_query(name));
    if let Some(folder) = folder {
        q.push_str(&format!(" and '{}' in parents", escape_query(folder)));
    }
    q
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn map_file(f: api::File) -> memsync::Result<RemoteFile> {
    let id = f
        .id
        .ok_or_else(|| memsync::remote_error!(None, "Expected to receive id from Google"))?;
    Ok(RemoteFile {
        id,
        name: f.name.unwrap_or_default(),
        parents: f.parents.unwrap_or_default(),
    })
}

mod api {
    use bytes::Bytes;
    use memsync::{error, FileId};
    use reqwest::StatusCode;
    use serde::{Deserialize, Serialize};

    use super::utils::{check_response, num_from_str, num_to_str};
    use crate::oauth2::GetToken;

    #[derive(Default, Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct User {
        pub display_name: String,
        pub email_address: Option<String>,
    }

    #[derive(Default, Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Quota {
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            serialize_with = "num_to_str",
            deserialize_with = "num_from_str"
        )]
        pub limit: Option<i64>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            serialize_with = "num_to_str",
            deserialize_with = "num_from_str"
        )]
        pub usage: Option<i64>,
    }

    impl Quota {
        /// `usage / limit` in binary units, if both are known
        pub fn describe_usage(&self) -> Option<String> {
            use byte_unit::{Byte, UnitType};

            let usage = Byte::from_i64(self.usage?)?.get_appropriate_unit(UnitType::Binary);
            let limit = Byte::from_i64(self.limit?)?.get_appropriate_unit(UnitType::Binary);
            Some(format!("{usage:#.2} / {limit:#.3}"))
        }
    }

    const ABOUT_FIELDS: &str = "kind,storageQuota,user";

    #[derive(Default, Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct About {
        kind: String,
        pub storage_quota: Quota,
        pub user: User,
    }

    pub const FILE_FIELDS: &str = "id,name,parents,trashed";

    #[derive(Default, Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct File {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub id: Option<FileId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub mime_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub parents: Option<Vec<FileId>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub trashed: Option<bool>,
    }

    #[derive(Default, Clone, Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct FileList {
        pub files: Option<Vec<File>>,
        pub next_page_token: Option<String>,
    }

    #[derive(Debug, Clone, Copy)]
    pub enum Scope {
        Full,
        MetadataReadOnly,
    }

    impl AsRef<str> for Scope {
        fn as_ref(&self) -> &str {
            match self {
                Scope::Full => "https://www.googleapis.com/auth/drive",
                Scope::MetadataReadOnly => {
                    "https://www.googleapis.com/auth/drive.metadata.readonly"
                }
            }
        }
    }

    impl From<Scope> for oauth2::Scope {
        fn from(value: Scope) -> Self {
            oauth2::Scope::new(value.as_ref().to_string())
        }
    }

    #[derive(Debug, Clone)]
    pub struct UploadParams<'a> {
        pub size: u64,
        pub mime_type: Option<&'a str>,
        pub fields: &'a str,
    }

    impl<'a> UploadParams<'a> {
        pub fn query_params(&'a self) -> Vec<(&'static str, &'a str)> {
            vec![
                ("uploadType", "resumable"),
                ("fields", self.fields),
                ("supportsAllDrives", "true"),
            ]
        }
    }

    pub const UPLOAD_CHUNK_SZ: usize = 2 * 256 * 1024;

    /// Bytes stored by an upload session, from the `Range` header of a 308 response.
    /// No header means nothing was stored yet.
    pub fn stored_len(range: Option<&str>) -> memsync::Result<usize> {
        let Some(range) = range else {
            return Ok(0);
        };
        range
            .strip_prefix("bytes=0-")
            .and_then(|last| last.parse::<usize>().ok())
            .map(|last| last + 1)
            .ok_or_else(|| memsync::remote_error!(Some(308), "Unexpected upload range: {range}"))
    }

    impl<A> super::GoogleDrive<A>
    where
        A: GetToken,
    {
        pub async fn about_get(&self) -> memsync::Result<About> {
            let path = "/about";
            let query_params = vec![("fields", ABOUT_FIELDS)];

            let res = self
                .get_query(&[Scope::MetadataReadOnly], path, query_params)
                .await?;
            let res = check_response("GET", path, res).await?;
            let about: About = res.json().await.map_err(error::remote)?;
            if about.kind != "drive#about" {
                memsync::remote_bail!(None, "/about returned wrong kind!");
            }
            Ok(about)
        }

        pub async fn files_list(
            &self,
            q: String,
            page_token: Option<String>,
        ) -> memsync::Result<FileList> {
            let path = "/files";

            let mut query_params = vec![
                ("q", q),
                ("fields", format!("nextPageToken,files({FILE_FIELDS})")),
                ("orderBy", "createdTime".into()),
                ("includeItemsFromAllDrives", "true".into()),
                ("supportsAllDrives", "true".into()),
            ];
            if let Some(page_token) = page_token {
                query_params.push(("pageToken", page_token));
            }

            let res = self
                .get_query(&[Scope::MetadataReadOnly], path, query_params)
                .await?;
            let res = check_response("GET", path, res).await?;

            let file_list: FileList = res.json().await.map_err(error::remote)?;
            Ok(file_list)
        }

        /// Sends `data` through a resumable upload session.
        /// `method` and `path` select creation (`POST /files`) or update (`PATCH /files/{id}`).
        pub async fn files_upload(
            &self,
            method: reqwest::Method,
            path: &str,
            file: Option<&File>,
            data: Bytes,
        ) -> memsync::Result<File> {
            let scopes = &[Scope::Full];
            let data_len = data.len();
            let upload_params = UploadParams {
                size: data_len as u64,
                mime_type: Some(super::JSON_MIMETYPE),
                fields: FILE_FIELDS,
            };
            let upload_url = self
                .upload_request(method.clone(), scopes, path, &upload_params, file)
                .await?;

            let mut sent = 0usize;
            loop {
                let end = usize::min(sent + UPLOAD_CHUNK_SZ, data_len);
                let chunk = data.slice(sent..end);
                log::trace!("uploading {} bytes at offset {sent}", chunk.len());
                let res = self
                    .upload_range(
                        scopes,
                        upload_url.clone(),
                        chunk,
                        sent as u64,
                        data_len as u64,
                    )
                    .await?;
                if res.status() != StatusCode::PERMANENT_REDIRECT {
                    let res = check_response(method.as_str(), path, res).await?;
                    break res.json().await.map_err(error::remote);
                }

                // 308: the session wants more, `Range` tells how much it has stored
                let range = res
                    .headers()
                    .get(reqwest::header::RANGE)
                    .and_then(|r| r.to_str().ok());
                let stored = stored_len(range)?;
                if stored >= data_len || stored <= sent {
                    memsync::remote_bail!(
                        Some(308),
                        "{method} {path}: upload session stalled at {stored} of {data_len} bytes"
                    );
                }
                sent = stored;
            }
        }
    }
}

mod utils {
    use std::borrow::Borrow;

    use bytes::Bytes;
    use memsync::error;
    use oauth2::AccessToken;
    use reqwest::{header, Response, StatusCode};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use url::Url;

    use super::api;
    use crate::oauth2::GetToken;

    pub fn num_to_str<S>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_str(&value.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn num_from_str<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use std::str::FromStr;

        let s = String::deserialize(deserializer)?;
        Ok(Some(i64::from_str(&s).map_err(serde::de::Error::custom)?))
    }

    pub async fn check_response(
        method: &str,
        path: &str,
        res: Response,
    ) -> memsync::Result<Response> {
        let status = res.status();
        if !status.is_success() {
            memsync::remote_bail!(
                Some(status.as_u16()),
                "{method} {path} returned {status}\n{}",
                res.text().await.map_err(error::remote)?
            );
        }
        Ok(res)
    }

    impl<A> super::GoogleDrive<A>
    where
        A: GetToken,
    {
        pub async fn fetch_token(&self, scopes: &[api::Scope]) -> memsync::Result<AccessToken> {
            let scopes = scopes.iter().map(|&s| s.into()).collect();
            self.auth.get_token(scopes).await
        }

        pub async fn get_query<Q, K, V>(
            &self,
            scopes: &[api::Scope],
            path: &str,
            query_params: Q,
        ) -> memsync::Result<Response>
        where
            Q: IntoIterator,
            Q::Item: Borrow<(K, V)>,
            K: AsRef<str>,
            V: AsRef<str>,
        {
            let token = self.fetch_token(scopes).await?;
            let url = url_with_query(&self.base_url, path, query_params)?;

            self.client
                .get(url)
                .header(header::USER_AGENT, &self.user_agent)
                .bearer_auth(token.secret())
                .send()
                .await
                .map_err(error::remote)
        }

        /// Opens a resumable upload session and returns its URL
        pub async fn upload_request<B>(
            &self,
            method: reqwest::Method,
            scopes: &[api::Scope],
            path: &str,
            params: &api::UploadParams<'_>,
            body: Option<&B>,
        ) -> memsync::Result<Url>
        where
            B: Serialize,
        {
            let token = self.fetch_token(scopes).await?;

            let url = url_with_query(&self.upload_base_url, path, params.query_params())?;
            let mut req = self
                .client
                .request(method.clone(), url)
                .bearer_auth(token.secret())
                .header(header::USER_AGENT, &self.user_agent)
                .header("X-Upload-Content-Length", params.size);
            if let Some(mt) = params.mime_type {
                req = req.header("X-Upload-Content-Type", mt);
            }
            if let Some(body) = body {
                req = req
                    .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
                    .json(body);
            } else {
                req = req.header(header::CONTENT_LENGTH, 0);
            }
            let res = req.send().await.map_err(error::remote)?;
            let res = check_response(method.as_str(), path, res).await?;
            if res.status() != StatusCode::OK {
                memsync::remote_bail!(
                    Some(res.status().as_u16()),
                    "{method} {path} returned {} instead of an upload session",
                    res.status()
                );
            }
            let location = res
                .headers()
                .get(header::LOCATION)
                .and_then(|loc| loc.to_str().ok())
                .ok_or_else(|| {
                    memsync::remote_error!(None, "{method} {path}: no upload session location")
                })?;
            Url::parse(location).map_err(error::remote)
        }

        pub async fn upload_range(
            &self,
            scopes: &[api::Scope],
            url: Url,
            data: Bytes,
            range_start: u64,
            range_len: u64,
        ) -> memsync::Result<Response> {
            let token = self.fetch_token(scopes).await?;

            let data_len = data.len() as u64;
            debug_assert!(range_len >= range_start + data_len);

            let mut req = self
                .client
                .put(url)
                .bearer_auth(token.secret())
                .header(header::USER_AGENT, &self.user_agent)
                .header(header::CONTENT_LENGTH, data_len);
            if let Some(range) = content_range(range_start, data_len, range_len) {
                req = req.header(header::CONTENT_RANGE, range);
            }
            req.body(data).send().await.map_err(error::remote)
        }
    }

    /// `Content-Range` of a chunk, or `None` if the chunk is the whole content
    pub fn content_range(range_start: u64, data_len: u64, range_len: u64) -> Option<String> {
        if range_start == 0 && data_len == range_len {
            return None;
        }
        Some(format!(
            "bytes {range_start}-{}/{range_len}",
            range_start + data_len - 1
        ))
    }

    pub fn url_with_query<B, P, Q, K, V>(
        base_url: B,
        path: P,
        query_params: Q,
    ) -> memsync::Result<Url>
    where
        B: AsRef<str>,
        P: AsRef<str>,
        Q: IntoIterator,
        Q::Item: Borrow<(K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let base = format!("{}{}", base_url.as_ref(), path.as_ref());
        Url::parse_with_params(&base, query_params)
            .map_err(|err| memsync::config_error!("Invalid API url {base}: {err}"))
    }
}
