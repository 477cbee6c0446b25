//! Idempotent upload stage
//!
//! Drives the upload of one group's stored records to the remote platform.
//! Every record's idempotency key is checked against the group's processed
//! collection before any remote call; a record already recorded there is
//! skipped, which is what makes repeated runs safe after partial completion.
//! A failure while processing one record is collected and the batch
//! continues; the returned failure list is the authoritative summary.

pub mod builders;

pub use builders::PostBuilder;

use crate::api::{ApiError, ContentApi};
use crate::store::{RecordStore, StoreError};
use crate::types::{groups, MissingField, Record};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Idempotency collection names, one per group
pub mod collections {
    pub const IMPORTED_IMAGES: &str = "imported_images";
    pub const IMPORTED_SECTIONS: &str = "imported_sections";
    pub const IMPORTED_AUTHORS: &str = "imported_authors";
    pub const IMPORTED_POSTS: &str = "imported_posts";
}

/// Groups in dependency order: posts reference everything else.
pub const IMPORT_ORDER: &[&str] = &[
    groups::ATTACHMENTS,
    groups::SECTIONS,
    groups::AUTHORS,
    groups::POSTS,
];

/// Item types the post importer uploads; everything else is skipped with a
/// notice, not treated as an error.
pub const IMPORTABLE_POST_TYPES: &[&str] = &["post", "page"];

/// Errors raised while uploading a single record. Fatal to that record only;
/// the batch continues.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<MissingField> for ImportError {
    fn from(err: MissingField) -> Self {
        ImportError::Validation(err.to_string())
    }
}

/// Explicit result of one record's upload attempt. Skips are ordinary
/// outcomes, not errors, so the continue-on-failure contract stays visible
/// in the types.
#[derive(Debug)]
pub enum UploadOutcome {
    /// Remote call succeeded; the payload becomes the idempotency record's
    /// response.
    Uploaded(Value),
    /// Record intentionally not uploaded (e.g. filtered post type)
    Skipped(&'static str),
}

/// One record group's upload specialization
pub trait GroupImporter {
    /// Collection the source records are read from
    fn source_collection(&self) -> &'static str;

    /// Collection the idempotency records are written to
    fn processed_collection(&self) -> &'static str;

    /// Fields forming the idempotency key
    fn key_fields(&self) -> &'static [&'static str];

    /// Shape and push one record to the remote platform
    fn upload(
        &mut self,
        api: &mut dyn ContentApi,
        record: &Record,
    ) -> Result<UploadOutcome, ImportError>;
}

/// Select the importer owning a group name. Static mapping, no runtime
/// dispatch on record contents.
pub fn importer_for_group(
    group: &str,
    store: &RecordStore,
) -> Result<Option<Box<dyn GroupImporter>>, ImportError> {
    Ok(match group {
        groups::ATTACHMENTS => Some(Box::new(ImageImporter)),
        groups::SECTIONS => Some(Box::new(SectionImporter::new())),
        groups::AUTHORS => Some(Box::new(AuthorImporter)),
        groups::POSTS => Some(Box::new(PostImporter::new(store)?)),
        _ => None,
    })
}

/// Upload every not-yet-processed record of the importer's group.
///
/// Returns one `(record, error)` pair per failed record. Iteration failures
/// on the source collection propagate; everything after that is isolated per
/// record.
pub fn upload_all(
    importer: &mut dyn GroupImporter,
    store: &RecordStore,
    api: &mut dyn ContentApi,
) -> Result<Vec<(Record, ImportError)>, ImportError> {
    let records = store.iter(importer.source_collection())?;
    info!(
        collection = importer.source_collection(),
        count = records.len(),
        "starting group import"
    );

    let mut failed = Vec::new();
    for record in records {
        if let Err(error) = process_record(importer, store, api, &record) {
            warn!(
                collection = importer.source_collection(),
                error = %error,
                "record upload failed"
            );
            failed.push((record, error));
        }
    }

    store.flush()?;
    Ok(failed)
}

fn process_record(
    importer: &mut dyn GroupImporter,
    store: &RecordStore,
    api: &mut dyn ContentApi,
    record: &Record,
) -> Result<(), ImportError> {
    let key = idempotency_key(importer.key_fields(), record)?;

    if store
        .find_match(importer.processed_collection(), &key)?
        .is_some()
    {
        info!(
            collection = importer.source_collection(),
            "record already processed, skipping"
        );
        return Ok(());
    }

    match importer.upload(api, record)? {
        UploadOutcome::Uploaded(response) => {
            let mut entry = Record::new();
            for (field, value) in key {
                entry.insert(field, value);
            }
            entry.insert("response", response);
            entry.insert("imported_at", Utc::now().to_rfc3339());
            store.insert(importer.processed_collection(), &entry)?;
        }
        UploadOutcome::Skipped(reason) => {
            info!(
                collection = importer.source_collection(),
                reason, "skipping record"
            );
        }
    }
    Ok(())
}

/// Extract the declared key fields from a record. Stable across runs: the
/// same source fields always produce the same key.
fn idempotency_key(
    fields: &[&str],
    record: &Record,
) -> Result<Vec<(String, Value)>, ImportError> {
    fields
        .iter()
        .map(|field| {
            record
                .require(field)
                .map(|value| (field.to_string(), value.clone()))
                .map_err(ImportError::from)
        })
        .collect()
}

/// Media attachments -> remote image uploads
pub struct ImageImporter;

impl GroupImporter for ImageImporter {
    fn source_collection(&self) -> &'static str {
        groups::ATTACHMENTS
    }

    fn processed_collection(&self) -> &'static str {
        collections::IMPORTED_IMAGES
    }

    fn key_fields(&self) -> &'static [&'static str] {
        &["id", "url"]
    }

    fn upload(
        &mut self,
        api: &mut dyn ContentApi,
        record: &Record,
    ) -> Result<UploadOutcome, ImportError> {
        let url = record.require_str("url")?;
        Url::parse(url).map_err(|e| {
            ImportError::Validation(format!("attachment url '{url}' is not a valid URL: {e}"))
        })?;
        let caption = record.require_str("content")?;
        let credit = record.require_str("excerpt")?;

        let image = api.upload_image(url, caption, credit, "")?;
        Ok(UploadOutcome::Uploaded(image.to_value()))
    }
}

/// Sections -> remote sections, reusing ones that already exist remotely
pub struct SectionImporter {
    /// Remote section payloads by url, fetched once on first upload
    existing: Option<HashMap<String, Value>>,
}

impl SectionImporter {
    pub fn new() -> Self {
        Self { existing: None }
    }

    fn ensure_existing(
        &mut self,
        api: &mut dyn ContentApi,
    ) -> Result<&mut HashMap<String, Value>, ImportError> {
        if self.existing.is_none() {
            let mut by_url = HashMap::new();
            for section in api.get_sections()? {
                if let Some(url) = section.get("url").and_then(Value::as_str) {
                    by_url.insert(url.to_string(), section.clone());
                }
            }
            info!(count = by_url.len(), "fetched existing remote sections");
            self.existing = Some(by_url);
        }
        Ok(self.existing.get_or_insert_with(HashMap::new))
    }
}

impl Default for SectionImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupImporter for SectionImporter {
    fn source_collection(&self) -> &'static str {
        groups::SECTIONS
    }

    fn processed_collection(&self) -> &'static str {
        collections::IMPORTED_SECTIONS
    }

    fn key_fields(&self) -> &'static [&'static str] {
        &["title", "url"]
    }

    fn upload(
        &mut self,
        api: &mut dyn ContentApi,
        record: &Record,
    ) -> Result<UploadOutcome, ImportError> {
        let title = record.require_str("title")?.to_string();
        let url = record.require_str("url")?.to_string();

        let existing = self.ensure_existing(api)?;
        if let Some(section) = existing.get(&url) {
            return Ok(UploadOutcome::Uploaded(section.clone()));
        }

        let response = api.create_section(&title, &url)?;
        self.ensure_existing(api)?.insert(url, response.clone());
        Ok(UploadOutcome::Uploaded(response))
    }
}

/// Authors -> remote author accounts
pub struct AuthorImporter;

/// Normalize a source login into a platform account name: separator
/// characters become underscores.
pub fn normalize_author_name(login: &str) -> String {
    login.replace(['.', ' '], "_")
}

impl GroupImporter for AuthorImporter {
    fn source_collection(&self) -> &'static str {
        groups::AUTHORS
    }

    fn processed_collection(&self) -> &'static str {
        collections::IMPORTED_AUTHORS
    }

    fn key_fields(&self) -> &'static [&'static str] {
        &["id", "login"]
    }

    fn upload(
        &mut self,
        api: &mut dyn ContentApi,
        record: &Record,
    ) -> Result<UploadOutcome, ImportError> {
        let id = record.require_str("id")?;
        let login = record.require_str("login")?;
        let email = record.require_str("email")?;
        let first_name = record.require_str("first_name")?;
        let last_name = record.require_str("last_name")?;

        let name = normalize_author_name(login);
        let specific_data = json!({
            "provider_user_key": login,
            "provider_user_id": id,
        });

        let response = api.create_author(email, &name, first_name, last_name, specific_data)?;
        Ok(UploadOutcome::Uploaded(response))
    }
}

/// Posts and pages -> drafts published on the remote platform
pub struct PostImporter {
    builder: PostBuilder,
}

impl PostImporter {
    /// Build the importer, loading the builder's prerequisite lookups from
    /// the idempotency collections.
    pub fn new(store: &RecordStore) -> Result<Self, ImportError> {
        Ok(Self {
            builder: PostBuilder::load(store)?,
        })
    }
}

impl GroupImporter for PostImporter {
    fn source_collection(&self) -> &'static str {
        groups::POSTS
    }

    fn processed_collection(&self) -> &'static str {
        collections::IMPORTED_POSTS
    }

    fn key_fields(&self) -> &'static [&'static str] {
        &["id"]
    }

    fn upload(
        &mut self,
        api: &mut dyn ContentApi,
        record: &Record,
    ) -> Result<UploadOutcome, ImportError> {
        let post_type = record.require_str("type")?;
        if !IMPORTABLE_POST_TYPES.contains(&post_type) {
            return Ok(UploadOutcome::Skipped("post type not importable"));
        }

        let entry = self.builder.build_entry(record)?;
        let post = self.builder.publish_entry(api, &entry)?;
        let post = self.builder.postpublish(post)?;

        if let Some(id) = builders::id_as_string(&post) {
            info!(post_id = %id, "published post");
        }
        Ok(UploadOutcome::Uploaded(post))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, UploadedImage};
    use tempfile::TempDir;

    /// Call-counting fake of the remote platform
    #[derive(Default)]
    struct FakeApi {
        calls: usize,
        fail_author_logins: Vec<String>,
        remote_sections: Vec<Value>,
        next_id: u64,
    }

    impl FakeApi {
        fn next_id(&mut self) -> u64 {
            self.next_id += 1;
            self.next_id
        }
    }

    impl ContentApi for FakeApi {
        fn upload_image(
            &mut self,
            _image_url: &str,
            _caption: &str,
            _credit: &str,
            _alt: &str,
        ) -> Result<UploadedImage, ApiError> {
            self.calls += 1;
            let id = self.next_id();
            Ok(UploadedImage {
                is_animated_gif: false,
                image_id: json!(id),
                shortcode: format!("[img-{id}]"),
                shortcode_id: json!(format!("sc-{id}")),
            })
        }

        fn get_sections(&mut self) -> Result<Vec<Value>, ApiError> {
            self.calls += 1;
            Ok(self.remote_sections.clone())
        }

        fn create_section(&mut self, title: &str, url: &str) -> Result<Value, ApiError> {
            self.calls += 1;
            let id = self.next_id();
            Ok(json!({ "id": id, "title": title, "url": url }))
        }

        fn create_author(
            &mut self,
            email: &str,
            name: &str,
            _first_name: &str,
            _last_name: &str,
            specific_data: Value,
        ) -> Result<Value, ApiError> {
            self.calls += 1;
            let login = specific_data["provider_user_key"]
                .as_str()
                .unwrap_or_default();
            if self.fail_author_logins.iter().any(|l| l == login) {
                return Err(ApiError::Remote {
                    status: 422,
                    body: Some(json!({ "error": "duplicate author" })),
                });
            }
            let id = self.next_id();
            Ok(json!({ "id": id, "email": email, "name": name }))
        }

        fn authors_by_name(&mut self, _names: &[String]) -> Result<Value, ApiError> {
            self.calls += 1;
            Ok(json!([]))
        }

        fn create_draft(&mut self, draft: &Value) -> Result<Value, ApiError> {
            self.calls += 1;
            let mut created = draft.clone();
            created["id"] = json!(self.next_id());
            Ok(created)
        }

        fn publish_draft(&mut self, draft_id: &str) -> Result<Value, ApiError> {
            self.calls += 1;
            Ok(json!({ "id": draft_id, "status": "published" }))
        }

        fn site_by_name(&mut self, name: &str) -> Result<Value, ApiError> {
            self.calls += 1;
            Ok(json!({ "name": name }))
        }
    }

    fn author_record(id: &str, login: &str) -> Record {
        let mut record = Record::new();
        record.insert("id", id);
        record.insert("login", login);
        record.insert("email", format!("{login}@example.com"));
        record.insert("first_name", "First");
        record.insert("last_name", "Last");
        record
    }

    fn open_store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_author_name_normalization() {
        assert_eq!(normalize_author_name("jane.doe smith"), "jane_doe_smith");
        assert_eq!(normalize_author_name("plain"), "plain");
    }

    #[test]
    fn test_upload_all_is_idempotent_across_runs() {
        let (_dir, store) = open_store();
        store.insert(groups::AUTHORS, &author_record("1", "jane")).unwrap();
        store.insert(groups::AUTHORS, &author_record("2", "bob")).unwrap();

        let mut api = FakeApi::default();
        let failed = upload_all(&mut AuthorImporter, &store, &mut api).unwrap();
        assert!(failed.is_empty());
        assert_eq!(api.calls, 2);
        assert_eq!(store.count(collections::IMPORTED_AUTHORS).unwrap(), 2);

        // Second run performs zero additional remote calls.
        let failed = upload_all(&mut AuthorImporter, &store, &mut api).unwrap();
        assert!(failed.is_empty());
        assert_eq!(api.calls, 2);
        assert_eq!(store.count(collections::IMPORTED_AUTHORS).unwrap(), 2);
    }

    #[test]
    fn test_failure_of_one_record_does_not_abort_the_batch() {
        let (_dir, store) = open_store();
        store.insert(groups::AUTHORS, &author_record("1", "first")).unwrap();
        store.insert(groups::AUTHORS, &author_record("2", "broken")).unwrap();
        store.insert(groups::AUTHORS, &author_record("3", "third")).unwrap();

        let mut api = FakeApi {
            fail_author_logins: vec!["broken".to_string()],
            ..FakeApi::default()
        };

        let failed = upload_all(&mut AuthorImporter, &store, &mut api).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0.get_str("login"), Some("broken"));
        assert!(matches!(failed[0].1, ImportError::Api(ApiError::Remote { .. })));

        // Records 1 and 3 each produced a persisted idempotency entry.
        assert_eq!(store.count(collections::IMPORTED_AUTHORS).unwrap(), 2);
    }

    #[test]
    fn test_idempotency_record_carries_key_fields_and_response() {
        let (_dir, store) = open_store();
        store.insert(groups::AUTHORS, &author_record("7", "amy")).unwrap();

        let mut api = FakeApi::default();
        upload_all(&mut AuthorImporter, &store, &mut api).unwrap();

        let entries = store.iter(collections::IMPORTED_AUTHORS).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get_str("id"), Some("7"));
        assert_eq!(entries[0].get_str("login"), Some("amy"));
        assert!(entries[0].get("response").is_some());
        assert!(entries[0].get_str("imported_at").is_some());
    }

    #[test]
    fn test_missing_key_field_is_collected_not_fatal() {
        let (_dir, store) = open_store();
        let mut incomplete = Record::new();
        incomplete.insert("login", "noid");
        store.insert(groups::AUTHORS, &incomplete).unwrap();
        store.insert(groups::AUTHORS, &author_record("1", "ok")).unwrap();

        let mut api = FakeApi::default();
        let failed = upload_all(&mut AuthorImporter, &store, &mut api).unwrap();
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0].1, ImportError::Validation(_)));
        assert_eq!(store.count(collections::IMPORTED_AUTHORS).unwrap(), 1);
    }

    #[test]
    fn test_image_import_stores_normalized_response() {
        let (_dir, store) = open_store();
        let mut attachment = Record::new();
        attachment.insert("id", "11");
        attachment.insert("url", "https://blog.example.com/banner.gif");
        attachment.insert("content", "The banner");
        attachment.insert("excerpt", "Staff photo");
        store.insert(groups::ATTACHMENTS, &attachment).unwrap();

        let mut api = FakeApi::default();
        let failed = upload_all(&mut ImageImporter, &store, &mut api).unwrap();
        assert!(failed.is_empty());

        let entries = store.iter(collections::IMPORTED_IMAGES).unwrap();
        assert_eq!(
            entries[0].get("response").unwrap()["shortcode"],
            json!("[img-1]")
        );
    }

    #[test]
    fn test_malformed_attachment_url_fails_before_any_call() {
        let (_dir, store) = open_store();
        let mut attachment = Record::new();
        attachment.insert("id", "11");
        attachment.insert("url", "not a url");
        attachment.insert("content", "");
        attachment.insert("excerpt", "");
        store.insert(groups::ATTACHMENTS, &attachment).unwrap();

        let mut api = FakeApi::default();
        let failed = upload_all(&mut ImageImporter, &store, &mut api).unwrap();
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0].1, ImportError::Validation(_)));
        assert_eq!(api.calls, 0);
    }

    #[test]
    fn test_existing_remote_section_is_reused() {
        let (_dir, store) = open_store();
        let mut section = Record::new();
        section.insert("title", "News");
        section.insert("url", "news");
        store.insert(groups::SECTIONS, &section).unwrap();

        let mut api = FakeApi {
            remote_sections: vec![json!({ "id": 50, "title": "News", "url": "news" })],
            ..FakeApi::default()
        };

        let mut importer = SectionImporter::new();
        let failed = upload_all(&mut importer, &store, &mut api).unwrap();
        assert!(failed.is_empty());

        // One get_sections call, no create_section call.
        assert_eq!(api.calls, 1);
        let entries = store.iter(collections::IMPORTED_SECTIONS).unwrap();
        assert_eq!(entries[0].get("response").unwrap()["id"], json!(50));
    }

    #[test]
    fn test_new_section_is_created() {
        let (_dir, store) = open_store();
        let mut section = Record::new();
        section.insert("title", "Opinion");
        section.insert("url", "opinion");
        store.insert(groups::SECTIONS, &section).unwrap();

        let mut api = FakeApi::default();
        let failed = upload_all(&mut SectionImporter::new(), &store, &mut api).unwrap();
        assert!(failed.is_empty());
        // get_sections + create_section
        assert_eq!(api.calls, 2);
    }

    #[test]
    fn test_post_import_drafts_then_publishes() {
        let (_dir, store) = open_store();

        // Prerequisite: imported author lookup for the builder.
        let mut author_entry = Record::new();
        author_entry.insert("id", "2");
        author_entry.insert("login", "jane");
        author_entry.insert("response", json!({ "id": 901 }));
        store
            .insert(collections::IMPORTED_AUTHORS, &author_entry)
            .unwrap();

        let mut post = Record::new();
        post.insert("id", "10");
        post.insert("type", "post");
        post.insert("title", "Hello");
        post.insert("content", "<p>Body</p>");
        post.insert("author", "jane");
        store.insert(groups::POSTS, &post).unwrap();

        let mut menu_item = Record::new();
        menu_item.insert("id", "12");
        menu_item.insert("type", "nav_menu_item");
        store.insert(groups::POSTS, &menu_item).unwrap();

        let mut api = FakeApi::default();
        let mut importer = PostImporter::new(&store).unwrap();
        let failed = upload_all(&mut importer, &store, &mut api).unwrap();
        assert!(failed.is_empty());

        // create_draft + publish_draft for the post; the menu item is
        // skipped without any call and without an idempotency entry.
        assert_eq!(api.calls, 2);
        assert_eq!(store.count(collections::IMPORTED_POSTS).unwrap(), 1);

        let entries = store.iter(collections::IMPORTED_POSTS).unwrap();
        assert_eq!(entries[0].get_str("id"), Some("10"));
        assert_eq!(
            entries[0].get("response").unwrap()["status"],
            json!("published")
        );
    }

    #[test]
    fn test_importer_for_group_static_mapping() {
        let (_dir, store) = open_store();
        for group in IMPORT_ORDER {
            assert!(importer_for_group(group, &store).unwrap().is_some());
        }
        assert!(importer_for_group("unknown", &store).unwrap().is_none());
    }
}
