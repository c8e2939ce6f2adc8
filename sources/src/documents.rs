use std::collections::BTreeMap;

use regex::Regex;

use godata_core::cache::Cache;
use godata_core::error::{CollectError, FetchError};
use godata_core::fetch::{DownloadReport, DownloadTask, Downloader, Transport};
use godata_core::util::text::sanitize_filename;

/// Disaster-report feeds, one per document type.
pub const FEED_TYPES: [(&str, &str); 4] = [
    (
        "epoa",
        "http://www.ifrc.org/Utils/Search/Rss.ashx?at=241&c=&co=&dt=1&f=2018&feed=appeals&re=&t=2018&ti=&zo=",
    ),
    (
        "ou",
        "http://www.ifrc.org/Utils/Search/Rss.ashx?at=56&c=&co=&dt=1&feed=appeals&re=&ti=&zo=",
    ),
    (
        "fr",
        "http://www.ifrc.org/Utils/Search/Rss.ashx?at=57&c=&co=&dt=1&feed=appeals&re=&ti=&zo=",
    ),
    (
        "ea",
        "http://www.ifrc.org/Utils/Search/Rss.ashx?at=246&c=&co=&dt=1&feed=appeals&re=&ti=&zo=",
    ),
];

pub const FILE_META: &str = "file_meta.json";

/// One document discovered in a feed listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentListing {
    pub doc_type: String,
    pub title: String,
    pub url: String,
}

/// Extracts `<item>` title/link pairs from the RSS listings. The feeds
/// are flat and regular enough that three anchored patterns cover them.
pub struct FeedParser {
    item: Regex,
    title: Regex,
    link: Regex,
}

impl FeedParser {
    pub fn new() -> Result<Self, CollectError> {
        Ok(Self {
            item: Regex::new(r"(?s)<item\b[^>]*>(.*?)</item>")?,
            title: Regex::new(r"(?s)<title>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</title>")?,
            link: Regex::new(r"(?s)<link>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</link>")?,
        })
    }

    pub fn parse(&self, doc_type: &str, xml: &str) -> Vec<DocumentListing> {
        let mut listings = Vec::new();
        for item in self.item.captures_iter(xml) {
            let body = &item[1];
            let title = self.title.captures(body).map(|c| unescape(&c[1]));
            let link = self.link.captures(body).map(|c| unescape(&c[1]));
            let (Some(title), Some(link)) = (title, link) else {
                tracing::warn!(doc_type, "feed item without title or link, skipping");
                continue;
            };
            listings.push(DocumentListing {
                doc_type: doc_type.to_string(),
                title,
                url: link,
            });
        }
        listings
    }
}

fn unescape(text: &str) -> String {
    text.trim()
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Pull every feed listing. A feed that cannot be fetched fails the
/// run: without the listing there is nothing to download.
pub async fn list_documents(
    transport: &dyn Transport,
    feeds: &[(&str, &str)],
) -> Result<Vec<DocumentListing>, CollectError> {
    let parser = FeedParser::new()?;
    let mut listings = Vec::new();
    for (doc_type, url) in feeds {
        tracing::info!(doc_type, url, "listing documents");
        let xml = transport.fetch_text(url).await?;
        let mut found = parser.parse(doc_type, &xml);
        tracing::info!(doc_type, count = found.len(), "documents listed");
        listings.append(&mut found);
    }
    Ok(listings)
}

/// Destination layout: `<cache>/pdf/<type>/<title>.pdf`, with a
/// `file_meta.json` side-car mapping `<type>__<filename>` back to the
/// originating URL.
pub fn plan_downloads(
    cache: &Cache,
    listings: &[DocumentListing],
) -> Result<Vec<DownloadTask>, CollectError> {
    let mut tasks = Vec::with_capacity(listings.len());
    let mut meta: BTreeMap<String, String> = BTreeMap::new();
    for listing in listings {
        let filename = format!("{}.pdf", sanitize_filename(&listing.title));
        let dest = cache.path(format!("pdf/{}/{}", listing.doc_type, filename));
        meta.insert(
            format!("{}__{}", listing.doc_type, filename),
            listing.url.clone(),
        );
        tasks.push(DownloadTask::new(listing.url.clone(), dest));
    }
    cache.store(FILE_META, &meta)?;
    Ok(tasks)
}

/// List, plan and bulk-download every feed document; failed downloads
/// get one sequential retry and permanent failures come back
/// enumerated in the report.
pub async fn download_documents(
    transport: std::sync::Arc<dyn Transport>,
    cache: &Cache,
    feeds: &[(&str, &str)],
    limit_per_host: usize,
) -> Result<DownloadReport, CollectError> {
    let listings = list_documents(transport.as_ref(), feeds).await?;
    let tasks = plan_downloads(cache, &listings)?;
    let downloader = Downloader::new(transport, limit_per_host);
    let report = downloader
        .download_all(tasks, |task, error: &FetchError| {
            tracing::error!(url = %task.url, %error, "document download failed");
        })
        .await;
    Ok(report)
}
