//! Typed XNAT calls built on the generic verbs of [`XnatClient`].

use std::collections::HashMap;

use tracing::{debug, instrument};
use xnatkit_shared::{
    EntityType, ExperimentRecord, PipelineRecord, ProjectRecord, ReconstructionRecord,
    ResourceRecord, Result, ScanRecord, SessionRecord, SubjectRecord, XnatKitError,
};

use crate::{XnatClient, archive_spec, paths};

/// Ordered `xsi` field assignments for a scan or session `PUT`
/// (e.g. `xnat:mrScanData/type` -> `T1`).
pub type ScanFields = Vec<(String, String)>;

const MR_SESSION: &str = "xnat:mrSessionData";
const MR_SCAN: &str = "xnat:mrScanData";
const IMAGE_SESSION: &str = "xnat:imageSessionData";

impl XnatClient {
    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create (or touch) a subject. 201 means it was created.
    #[instrument(skip(self))]
    pub async fn add_subject(&self, project: &str, subject: &str) -> Result<u16> {
        self.put(&paths::subject(project, subject), &[]).await
    }

    /// Create (or touch) an MR session with extra `xnat:mrSessionData/...` fields.
    #[instrument(skip(self, fields))]
    pub async fn add_session(
        &self,
        project: &str,
        subject: &str,
        label: &str,
        fields: &[(String, String)],
    ) -> Result<u16> {
        let mut query = vec![("xsiType", MR_SESSION)];
        query.extend(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        self.put(&paths::session(project, subject, label), &query).await
    }

    /// Create (or update) an MR scan with `xnat:mrScanData/...` fields.
    #[instrument(skip(self, fields))]
    pub async fn add_scan(
        &self,
        project: &str,
        subject: &str,
        session: &str,
        scan_id: &str,
        fields: &[(String, String)],
    ) -> Result<u16> {
        let mut query = vec![("xsiType", MR_SCAN)];
        query.extend(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        self.put(&paths::scan(project, subject, session, scan_id), &query)
            .await
    }

    // -----------------------------------------------------------------------
    // Listings
    // -----------------------------------------------------------------------

    /// Projects visible to the authenticated user.
    pub async fn projects(&self) -> Result<Vec<ProjectRecord>> {
        self.query(&paths::projects(), &[]).await
    }

    pub async fn subjects(&self, project: &str) -> Result<Vec<SubjectRecord>> {
        self.query(&paths::subjects(project), &[("columns", "ID,label,insert_date")])
            .await
    }

    /// Imaging sessions (any modality) of one subject.
    pub async fn image_sessions(&self, project: &str, subject: &str) -> Result<Vec<SessionRecord>> {
        self.query(
            &paths::subject_experiments(project, subject),
            &[
                ("xsiType", IMAGE_SESSION),
                ("columns", "ID,label,insert_date,xsiType"),
            ],
        )
        .await
    }

    /// MR sessions of a whole project, with their subject labels.
    pub async fn mr_sessions(&self, project: &str) -> Result<Vec<ExperimentRecord>> {
        self.query(
            &paths::project_experiments(project),
            &[("xsiType", MR_SESSION), ("columns", "subject_label,label")],
        )
        .await
    }

    pub async fn reconstructions(&self, experiment: &str) -> Result<Vec<ReconstructionRecord>> {
        self.query(&paths::experiment_reconstructions(experiment), &[])
            .await
    }

    pub async fn scans(&self, experiment: &str) -> Result<Vec<ScanRecord>> {
        self.query(&paths::experiment_scans(experiment), &[]).await
    }

    /// Resource collections attached to a project, subject or experiment.
    pub async fn resources(&self, kind: EntityType, id: &str) -> Result<Vec<ResourceRecord>> {
        self.query(&paths::entity_resources(kind, id), &[]).await
    }

    pub async fn project_pipelines(&self, project: &str) -> Result<Vec<PipelineRecord>> {
        self.query(&paths::project_pipelines(project), &[]).await
    }

    // -----------------------------------------------------------------------
    // Pipelines
    // -----------------------------------------------------------------------

    /// Map of pipeline name -> launchable step id for a project.
    #[instrument(skip(self))]
    pub async fn pipeline_aliases(&self, project: &str) -> Result<HashMap<String, String>> {
        let xml = self.get_text(&paths::archive_spec(project)).await?;
        let aliases = archive_spec::parse_pipeline_aliases(&xml)?;
        debug!(count = aliases.len(), "pipeline aliases resolved");
        Ok(aliases)
    }

    /// Resolve one pipeline name to its step id.
    pub async fn pipeline_alias(&self, project: &str, pipeline: &str) -> Result<String> {
        self.pipeline_aliases(project)
            .await?
            .remove(pipeline)
            .ok_or_else(|| {
                XnatKitError::xnat(format!(
                    "pipeline {pipeline} has no step id in the archive spec of project {project}"
                ))
            })
    }

    /// Queue a pipeline run for one experiment.
    #[instrument(skip(self))]
    pub async fn launch_pipeline(&self, project: &str, alias: &str, experiment: &str) -> Result<u16> {
        self.post(&paths::launch_pipeline(project, alias, experiment), &[])
            .await
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Delete a reconstruction together with its files.
    pub async fn delete_reconstruction(&self, experiment: &str, reconstruction: &str) -> Result<u16> {
        let path = paths::reconstruction(experiment, reconstruction);
        self.delete(&path, &[("removeFiles", "true")]).await
    }

    /// Delete an experiment and its files.
    pub async fn delete_session(&self, project: &str, subject: &str, session: &str) -> Result<u16> {
        let path = paths::archive_session(project, subject, session);
        self.delete(&path, &[("removeFiles", "true")]).await
    }

    /// Delete a subject and its files.
    pub async fn delete_subject(&self, project: &str, subject: &str) -> Result<u16> {
        let path = paths::archive_subject(project, subject);
        self.delete(&path, &[("removeFiles", "true")]).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::{ClientOptions, XnatClient};

    fn client_for(server: &MockServer) -> XnatClient {
        XnatClient::new(&ClientOptions::new(server.uri(), "jdoe", "secret")).unwrap()
    }

    #[tokio::test]
    async fn add_scan_sends_xsi_fields() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/data/projects/P1/subjects/S1/experiments/E1/scans/101"))
            .and(query_param("xsiType", "xnat:mrScanData"))
            .and(query_param("xnat:mrScanData/type", "T1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fields = vec![("xnat:mrScanData/type".to_string(), "T1".to_string())];
        let status = client_for(&server)
            .add_scan("P1", "S1", "E1", "101", &fields)
            .await
            .unwrap();
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn pipeline_alias_from_archive_spec() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/projects/P1/archive_spec"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<arc:project xmlns:arc="http://nrg.wustl.edu/arc"><arc:pipelines><arc:descendants><arc:descendant><arc:pipeline stepId="step7"><arc:name>FreeSurfer</arc:name></arc:pipeline></arc:descendant></arc:descendants></arc:pipelines></arc:project>"#,
            ))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.pipeline_alias("P1", "FreeSurfer").await.unwrap(), "step7");
        assert!(client.pipeline_alias("P1", "Missing").await.unwrap_err().is_xnat());
    }

    #[tokio::test]
    async fn reconstruction_delete_removes_files() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/data/experiments/E1/reconstructions/R1"))
            .and(query_param("removeFiles", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .delete_reconstruction("E1", "R1")
            .await
            .unwrap();
    }
}
