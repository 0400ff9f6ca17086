use bacalhau_types::Job;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobSortBy {
    Id,
    #[default]
    CreatedAt,
}

/// Filter, sort and paginate jobs
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    /// Only jobs submitted by this client
    pub client_id: Option<String>,

    /// Keep jobs carrying any of these annotations
    pub include_tags: Vec<String>,

    /// Drop jobs carrying any of these annotations
    pub exclude_tags: Vec<String>,

    pub sort_by: JobSortBy,

    pub sort_reverse: bool,

    pub offset: usize,

    /// `None` returns everything after `offset`
    pub limit: Option<usize>,
}

impl JobQuery {
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(client_id) = &self.client_id {
            if &job.metadata.client_id != client_id {
                return false;
            }
        }
        if !self.include_tags.is_empty()
            && !self.include_tags.iter().any(|tag| job.has_annotation(tag))
        {
            return false;
        }
        !self.exclude_tags.iter().any(|tag| job.has_annotation(tag))
    }

    pub fn apply(&self, jobs: Vec<Job>) -> Vec<Job> {
        let mut jobs: Vec<Job> = jobs.into_iter().filter(|job| self.matches(job)).collect();

        match self.sort_by {
            JobSortBy::Id => jobs.sort_by(|a, b| a.id.cmp(&b.id)),
            JobSortBy::CreatedAt => jobs.sort_by(|a, b| {
                a.metadata
                    .created_at
                    .cmp(&b.metadata.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }
        if self.sort_reverse {
            jobs.reverse();
        }

        let page = jobs.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        }
    }
}
