//! JSON representations of patches and the rows they reference.
//!
//! Every shape is rendered for exactly one API version. Fields that a
//! version does not know about are `None` and skipped during serialization.

use serde::Serialize;
use serde_json::{Map, Value};

use super::version::RequestVersion;
use crate::headers::headers_to_json;
use crate::models::{PatchDetail, Person, Project, Series, User};

/// Builds absolute URLs for one request.
#[derive(Debug, Clone)]
pub struct Links {
    base_url: String,
    version: RequestVersion,
}

impl Links {
    pub fn new(base_url: &str, version: RequestVersion) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            version,
        }
    }

    pub fn version(&self) -> RequestVersion {
        self.version
    }

    /// API resource URL, e.g. `http://host/api/1.0/patches/3/`.
    pub fn api(&self, resource: &str, id: i64) -> String {
        format!(
            "{}{}/{}/{}/",
            self.base_url,
            self.version.api_prefix(),
            resource,
            id
        )
    }

    /// Web UI URL for an absolute site path.
    pub fn web(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Patch list URL for this version.
    pub fn patch_list(&self) -> String {
        format!("{}{}/patches/", self.base_url, self.version.api_prefix())
    }
}

/// Which endpoint the patch is rendered for. List views never carry the
/// message body fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    List,
    Detail,
}

#[derive(Debug, Serialize)]
pub struct ProjectJson {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub link_name: String,
    pub list_id: String,
    pub list_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scm_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webscm_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PersonJson {
    pub id: i64,
    pub url: String,
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct UserJson {
    pub id: i64,
    pub url: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SeriesJson {
    pub id: i64,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    pub name: Option<String>,
    pub date: String,
    pub version: i32,
    pub mbox: String,
}

#[derive(Debug, Serialize)]
pub struct PatchJson {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    pub project: ProjectJson,
    pub msgid: String,
    pub date: String,
    pub name: String,
    pub commit_ref: Option<String>,
    pub pull_url: Option<String>,
    pub state: String,
    pub archived: bool,
    pub hash: Option<String>,
    pub submitter: PersonJson,
    pub delegate: Option<UserJson>,
    pub mbox: String,
    /// Zero or one entries; legacy patches without a series get `[]`.
    pub series: Vec<SeriesJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub tags: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Option<String>>,
}

pub fn project_json(project: &Project, links: &Links) -> ProjectJson {
    let web = links.version().version.has_web_links();
    ProjectJson {
        id: project.id,
        url: links.api("projects", project.id),
        name: project.name.clone(),
        link_name: project.linkname.clone(),
        list_id: project.listid.clone(),
        list_email: project.listemail.clone(),
        web_url: web.then(|| project.web_url.clone()),
        scm_url: web.then(|| project.scm_url.clone()),
        webscm_url: web.then(|| project.webscm_url.clone()),
    }
}

pub fn person_json(person: &Person, links: &Links) -> PersonJson {
    PersonJson {
        id: person.id,
        url: links.api("people", person.id),
        name: person.name.clone(),
        email: person.email.clone(),
    }
}

pub fn user_json(user: &User, links: &Links) -> UserJson {
    UserJson {
        id: user.id,
        url: links.api("users", user.id),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        email: user.email.clone(),
    }
}

pub fn series_json(series: &Series, links: &Links) -> SeriesJson {
    let web = links.version().version.has_web_links();
    SeriesJson {
        id: series.id,
        url: links.api("series", series.id),
        web_url: web.then(|| links.web(&format!("/series/{}/", series.id))),
        name: series.name.clone(),
        date: series.date.clone(),
        version: series.version,
        mbox: links.web(&format!("/series/{}/mbox/", series.id)),
    }
}

pub fn patch_json(detail: &PatchDetail, links: &Links, view: View) -> PatchJson {
    let patch = &detail.patch;
    let web = links.version().version.has_web_links();
    let full = view == View::Detail;

    PatchJson {
        id: patch.id,
        url: (!web).then(|| links.api("patches", patch.id)),
        web_url: web.then(|| links.web(&format!("/patch/{}/", patch.id))),
        project: project_json(&detail.project, links),
        msgid: patch.msgid.clone(),
        date: patch.date.clone(),
        name: patch.name.clone(),
        commit_ref: patch.commit_ref.clone(),
        pull_url: patch.pull_url.clone(),
        state: detail.state.slug.clone(),
        archived: patch.archived,
        hash: patch.hash.clone(),
        submitter: person_json(&detail.submitter, links),
        delegate: detail.delegate.as_ref().map(|d| user_json(d, links)),
        mbox: links.web(&format!("/patch/{}/mbox/", patch.id)),
        series: detail
            .series
            .iter()
            .map(|s| series_json(s, links))
            .collect(),
        comments: web.then(|| format!("{}comments/", links.api("patches", patch.id))),
        tags: Map::new(),
        headers: full.then(|| headers_to_json(&patch.headers)),
        content: full.then(|| patch.content.clone()),
        diff: full.then(|| patch.diff.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::version::ApiVersion;
    use crate::models::{Patch, State};

    fn detail(series: Option<Series>) -> PatchDetail {
        PatchDetail {
            patch: Patch {
                id: 7,
                project_id: 1,
                msgid: "<7@example.com>".into(),
                name: "[PATCH] seven".into(),
                date: "2024-01-01T00:00:00".into(),
                submitter_id: 2,
                delegate_id: None,
                state_id: 3,
                archived: false,
                hash: None,
                commit_ref: None,
                pull_url: None,
                series_id: series.as_ref().map(|s| s.id),
                content: "body".into(),
                diff: Some("diff".into()),
                headers: "To: a@b\nTo: c@d\n".into(),
            },
            project: Project {
                id: 1,
                linkname: "proj".into(),
                name: "Proj".into(),
                listid: "proj.example.com".into(),
                listemail: "proj@example.com".into(),
                web_url: "https://proj.example.com".into(),
                scm_url: String::new(),
                webscm_url: String::new(),
            },
            submitter: Person {
                id: 2,
                name: Some("Sub".into()),
                email: "sub@example.com".into(),
                user_id: None,
            },
            state: State {
                id: 3,
                name: "Under Review".into(),
                slug: "under-review".into(),
                ordering: 1,
                action_required: true,
            },
            delegate: None,
            series,
        }
    }

    fn render(detail: &PatchDetail, version: RequestVersion, view: View) -> Value {
        let links = Links::new("http://pw.example.com/", version);
        serde_json::to_value(patch_json(detail, &links, view)).unwrap()
    }

    #[test]
    fn test_current_version_shape() {
        let json = render(&detail(None), RequestVersion::current(), View::Detail);
        assert_eq!(json["web_url"], "http://pw.example.com/patch/7/");
        assert_eq!(
            json["comments"],
            "http://pw.example.com/api/patches/7/comments/"
        );
        assert!(json.get("url").is_none());
        assert_eq!(json["state"], "under-review");
        assert_eq!(json["mbox"], "http://pw.example.com/patch/7/mbox/");
        assert_eq!(json["project"]["web_url"], "https://proj.example.com");
        assert_eq!(json["series"], serde_json::json!([]));
        assert_eq!(json["delegate"], Value::Null);
        assert_eq!(json["tags"], serde_json::json!({}));
    }

    #[test]
    fn test_legacy_version_shape() {
        let version = RequestVersion::explicit(ApiVersion::V1_0);
        let json = render(&detail(None), version, View::Detail);
        assert_eq!(json["url"], "http://pw.example.com/api/1.0/patches/7/");
        assert!(json.get("web_url").is_none());
        assert!(json.get("comments").is_none());
        assert!(json["project"].get("web_url").is_none());
        assert_eq!(json["project"]["url"], "http://pw.example.com/api/1.0/projects/1/");
    }

    #[test]
    fn test_list_view_omits_body_fields() {
        let json = render(&detail(None), RequestVersion::current(), View::List);
        assert!(json.get("headers").is_none());
        assert!(json.get("content").is_none());
        assert!(json.get("diff").is_none());

        let json = render(&detail(None), RequestVersion::current(), View::Detail);
        assert_eq!(json["content"], "body");
        assert_eq!(json["diff"], "diff");
        assert_eq!(json["headers"]["To"], serde_json::json!(["a@b", "c@d"]));
    }

    #[test]
    fn test_series_is_single_element_list() {
        let series = Series {
            id: 4,
            project_id: 1,
            name: Some("s".into()),
            date: "2024-01-01T00:00:00".into(),
            version: 1,
        };
        let json = render(&detail(Some(series)), RequestVersion::current(), View::List);
        let series = json["series"].as_array().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0]["id"], 4);
        assert_eq!(series[0]["web_url"], "http://pw.example.com/series/4/");
    }
}
