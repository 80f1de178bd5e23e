/// Facts about this build, fixed at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub documentation: &'static str,
    pub git_branch: Option<&'static str>,
    pub git_commit: Option<&'static str>,
    pub build_user: Option<&'static str>,
    pub build_date: Option<&'static str>,
    pub target_os: &'static str,
    pub target_arch: &'static str,
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    name: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
    description: env!("CARGO_PKG_DESCRIPTION"),
    documentation: "https://docs.aws.amazon.com/IAM/latest/UserGuide/id_roles_providers_saml.html",
    git_branch: option_env!("GETKEYS_GIT_BRANCH"),
    git_commit: option_env!("GETKEYS_GIT_COMMIT"),
    build_user: option_env!("GETKEYS_BUILD_USER"),
    build_date: option_env!("GETKEYS_BUILD_DATE"),
    target_os: std::env::consts::OS,
    target_arch: std::env::consts::ARCH,
};

impl BuildInfo {
    /// `<name> <version>[, branch: b][, commit: c][, build on <date> by <user>[ for <os>/<arch>]]`
    pub fn version_string(&self) -> String {
        let mut out = format!("{} {}", self.name, self.version);
        if let Some(branch) = self.git_branch.filter(|b| !b.is_empty()) {
            out.push_str(&format!(", branch: {}", branch));
        }
        if let Some(commit) = self.git_commit.filter(|c| !c.is_empty()) {
            out.push_str(&format!(", commit: {}", commit));
        }
        if let Some(date) = self.build_date.filter(|d| !d.is_empty()) {
            out.push_str(&format!(
                ", build on {} by {}",
                date,
                self.build_user.unwrap_or("unknown")
            ));
            if !self.target_os.is_empty() && !self.target_arch.is_empty() {
                out.push_str(&format!(" for {}/{}", self.target_os, self.target_arch));
            }
        }
        out
    }
}
