use std::fmt;

use anyhow::{anyhow, Result};

/// A domain whose resolution latency is measured, e.g. "google.com".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainTarget {
	domain: String,
}

impl DomainTarget {
	/// Build a target from a domain name.
	///
	/// Surrounding whitespace and a trailing root dot are stripped.
	/// Returns an error if nothing is left.
	pub fn new(domain: &str) -> Result<Self> {
		let trimmed = domain.trim().trim_end_matches('.');
		if trimmed.is_empty() {
			return Err(anyhow!("empty domain name"));
		}
		Ok(Self { domain: trimmed.to_string() })
	}

	pub fn as_str(&self) -> &str {
		&self.domain
	}
}

impl fmt::Display for DomainTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.domain)
	}
}

/// Return the built-in list of popular domains used to seed an empty domain table.
pub fn default_domains() -> Vec<String> {
	vec![
		"google.com",
		"facebook.com",
		"youtube.com",
		"yahoo.com",
		"live.com",
		"wikipedia.org",
		"baidu.com",
		"blogger.com",
		"msn.com",
		"qq.com",
	].into_iter().map(String::from).collect()
}

/// Read domains from a file, one per line.
///
/// Blank lines and lines starting with '#' are skipped.
pub fn read_domain_file(path: &str) -> Result<Vec<String>> {
	let content = std::fs::read_to_string(path)
		.map_err(|e| anyhow!("failed to read domain file '{}': {}", path, e))?;
	let domains: Vec<String> = content.lines()
		.map(|line| line.trim().to_string())
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.collect();
	Ok(domains)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_domains_size() {
		let domains = default_domains();
		assert_eq!(domains.len(), 10);
		assert_eq!(domains[0], "google.com");
	}

	#[test]
	fn test_default_domains_are_valid_targets() {
		for domain in default_domains() {
			assert!(DomainTarget::new(&domain).is_ok(), "invalid default: {}", domain);
		}
	}

	#[test]
	fn test_target_trims_whitespace_and_root_dot() {
		let target = DomainTarget::new("  example.com. ").unwrap();
		assert_eq!(target.as_str(), "example.com");
		assert_eq!(target.to_string(), "example.com");
	}

	#[test]
	fn test_empty_target_rejected() {
		assert!(DomainTarget::new("").is_err());
		assert!(DomainTarget::new("   ").is_err());
		assert!(DomainTarget::new(".").is_err());
	}

	#[test]
	fn test_read_domain_file_skips_comments() {
		let path = std::env::temp_dir().join(format!("domains-{}.txt", std::process::id()));
		std::fs::write(&path, "# top sites\ngoogle.com\n\n  msn.com  \n#qq.com\n").unwrap();
		let domains = read_domain_file(path.to_str().unwrap()).unwrap();
		std::fs::remove_file(&path).ok();
		assert_eq!(domains, vec!["google.com".to_string(), "msn.com".to_string()]);
	}

	#[test]
	fn test_read_domain_file_missing() {
		let result = read_domain_file("/nonexistent/domains.txt");
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("failed to read domain file"));
	}
}
