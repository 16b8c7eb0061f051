//! Help pages for `<node>/help`.

use crate::Result;
use crate::models::{BuilderStatus, ProjectStatus};
use crate::storage::StatusStore;

/// Reference for the supported query parameters.
pub const FLAGS: &str = "\
  - as_text
    - By default, application/json is used. Setting as_text=1 change the type
      to text/plain and implicitly sets compact=0 and filter=1. Mainly useful to
      look at the result in a web browser.
  - compact
    - By default, the json data is compact and defaults to 1. For easier to read
      indented output, set compact=0.
  - select
    - By default, most children data is listed. You can do a random selection
      of data by using select=<sub-url> multiple times to coagulate data.
      \"select=\" includes the actual url otherwise it is skipped.
  - numbuilds
    - By default, only in memory cached builds are listed. You can ask for more
      data by using numbuilds=<number>.
  - filter
    - Filters out null, false, and empty string, list and dict. This reduce the
      amount of useless data sent.
  - callback
    - Enable uses of JSONP. Access-Control-Allow-Origin:* is set in the HTTP
      response header so you can use this in compatible browsers.
  - <codebase>_branch
    - Filter builds by the codebases they use, for example:
      unity_branch=trunk&cellsdk_branch=default
      Note: You will probably need to specify all of the codebases.
  - branch
    - Filter historical listings by branch name. May be repeated.
  - results
    - Filter builds by the build results. For example:
      results=0&results=7
      will only return the build where the result is either 0 or 7.
";

/// Example URLs; placeholders are filled in by [`HelpCatalog::discover`].
pub const EXAMPLES: &str = "\
  - /json
    - Root node, that *doesn't* mean all the data. Many things (like logs) must
      be explicitly queried for performance reasons.
  - /json/builders/
    - All builders.
  - /json/builders/<A_BUILDER>
    - A specific builder as compact text.
  - /json/builders/<A_BUILDER>/builds
    - All *cached* builds.
  - /json/builders/<A_BUILDER>/builds/_all
    - All builds. Warning, reads all previous build data. (Can be filtered by codebases)
  - /json/builders/<A_BUILDER>/builds/<A_BUILD>
    - Where <A_BUILD> is either positive, a build number, or negative, a past
      build. Using <4 will give the last 4 builds.
  - /json/builders/<A_BUILDER>/builds/-1/source_stamp/changes
    - Build changes
  - /json/builders/<A_BUILDER>/builds?select=-1&select=-2
    - Two last builds on '<A_BUILDER>' builder.
  - /json/builders/<A_BUILDER>/builds?select=-1/source_stamp/changes&select=-2/source_stamp/changes
    - Changes of the two last builds on '<A_BUILDER>' builder.
  - /json/builders/<A_BUILDER>/slaves
    - Slaves associated to this builder.
  - /json/builders/<A_BUILDER>?select=&select=builds/-1
    - Builder information plus its most recent build.
  - /json/slaves/<A_SLAVE>
    - A specific slave.
  - /json/slaves/<A_SLAVE>/builds
    - The current builds on a specific slave
  - /json/slaves/<A_SLAVE>/builds/<15
    - The last 15 builds built on a specific slave
  - /json?select=slaves/<A_SLAVE>/&select=project&select=builders/<A_BUILDER>/builds/<A_BUILD>
    - A selection of random unrelated stuff as an random example. :)
  - /json/projects/
    - All projects
  - /json/projects/<A_PROJECT>
    - A specific project.
  - /json/projects/<A_PROJECT>/<A_BUILDER>
    - A specific builder on a project.
  - /json/buildqueue/
    - The current build queue
  - /json/pending/<A_BUILDER>/
    - The current pending builds for a builder (Can be filtered by codebases)
  - /json/globalstatus/
    - Global information about the current builds and slaves in use
";

/// Help text with examples pointing at real entities of this master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpCatalog {
    examples: String,
}

impl Default for HelpCatalog {
    fn default() -> Self {
        Self {
            examples: EXAMPLES.to_string(),
        }
    }
}

impl HelpCatalog {
    /// Fill the example placeholders from the first builder with a build
    /// (or the last builder when none has one).
    pub async fn discover(
        store: &dyn StatusStore,
        builders: &[BuilderStatus],
        projects: &[ProjectStatus],
    ) -> Result<Self> {
        let mut chosen = None;
        for builder in builders {
            let latest = store.cached_build(&builder.name, -1).await?;
            chosen = Some((builder, latest.as_ref().map(|b| b.number)));
            if latest.is_some() {
                break;
            }
        }
        let Some((builder, latest)) = chosen else {
            return Ok(Self::default());
        };

        let mut examples = EXAMPLES.replace("<A_BUILDER>", &builder.name);
        if let Some(project) = projects.first() {
            examples = examples.replace("<A_PROJECT>", &project.name);
        }
        if let Some(number) = latest {
            examples = examples.replace("<A_BUILD>", &number.to_string());
        }
        if let Some(slave) = builder.slaves.first() {
            examples = examples.replace("<A_SLAVE>", slave);
        }
        Ok(Self { examples })
    }

    pub fn examples(&self) -> &str {
        &self.examples
    }

    /// Plain-text help page for a node.
    pub fn page(&self, text: &str, children: &[String]) -> String {
        let mut page = String::new();
        page.push_str(text.trim_end());
        page.push_str("\n\n");
        if !children.is_empty() {
            page.push_str("Children: ");
            page.push_str(&children.join(", "));
            page.push_str("\n\n");
        }
        page.push_str("Flags:\n");
        page.push_str(FLAGS);
        page.push_str("\nExamples:\n");
        page.push_str(&self.examples);
        page
    }
}
