//! Print one cached listing

use anyhow::Result;
use colored::Colorize;
use gleaner_core::{Config, Error, JobRecord, ListingPage};

use super::open_cache;
use crate::output::{OutputFormat, print_json};

/// Execute the get command
pub async fn execute(config: Config, source_id: &str, format: OutputFormat) -> Result<()> {
    let cache = open_cache(config).await?;
    let Some(page) = cache.get(source_id).await else {
        return Err(Error::NotFound(format!("no fresh cache entry for '{source_id}'")).into());
    };

    match format {
        OutputFormat::Json => print_json(&page)?,
        OutputFormat::Text => print_page(&page),
    }
    Ok(())
}

fn print_page(page: &ListingPage) {
    println!("{}", page.title.as_deref().unwrap_or(&page.source_url).bold());
    println!("{}", page.source_url.dimmed());
    println!("{} jobs\n", page.jobs.len());

    for job in &page.jobs {
        println!("- {}", describe(job));
    }
}

fn describe(job: &JobRecord) -> String {
    let mut line = job.title.clone();
    if let Some(company) = &job.company {
        line.push_str(&format!(" @ {company}"));
    }
    if let Some(location) = &job.location {
        line.push_str(&format!(" ({location})"));
    }
    if let Some(bucket) = job.salary_bucket() {
        line.push_str(&format!(" [{bucket}]"));
    }
    if !job.technologies.is_empty() {
        line.push_str(&format!(" - {}", job.technologies.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_skips_missing_fields() {
        assert_eq!(describe(&JobRecord::new("Engineer")), "Engineer");

        let job = JobRecord::new("Engineer")
            .with_company("Acme")
            .with_location("Berlin")
            .with_technologies(["rust", "tokio"]);
        assert_eq!(describe(&job), "Engineer @ Acme (Berlin) - rust, tokio");
    }
}
