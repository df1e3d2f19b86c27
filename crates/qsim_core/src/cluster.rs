use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embed::EmbeddingProvider;
use crate::error::{QsimError, Result};
use crate::model::{GroupMatch, Question, QuestionGroup, QuestionGroups};
use crate::similarity::SimilarityMatrix;

/// How local similarity groups are combined into result groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Single pass in question order; a local group joins the earliest
    /// existing group it overlaps and pulls in any other group it bridges.
    /// Members are listed in the order they joined.
    #[default]
    Greedy,
    /// Connected components of the similarity graph, members in input order.
    /// The partition does not depend on input order.
    Components,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::Greedy => "greedy",
            MergeStrategy::Components => "components",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "greedy" => Ok(MergeStrategy::Greedy),
            "components" => Ok(MergeStrategy::Components),
            other => Err(format!(
                "unknown merge strategy '{other}' (expected greedy or components)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterOptions {
    pub threshold: f32,
    pub merge: MergeStrategy,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            threshold: crate::config::DEFAULT_THRESHOLD,
            merge: MergeStrategy::default(),
        }
    }
}

impl ClusterOptions {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(QsimError::InvalidThreshold(self.threshold));
        }
        Ok(())
    }
}

/// Drop repeated question texts. The first occurrence, and its source, wins.
pub fn dedup_questions(questions: &[Question]) -> Vec<Question> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(questions.len());
    questions
        .iter()
        .filter(|q| seen.insert(q.text.as_str()))
        .cloned()
        .collect()
}

/// Group question indices by similarity. Each returned group has at least two
/// members, its first member is the reference, and no index appears twice.
pub fn group_indices(
    matrix: &SimilarityMatrix,
    threshold: f32,
    strategy: MergeStrategy,
) -> Vec<Vec<usize>> {
    match strategy {
        MergeStrategy::Greedy => greedy_groups(matrix, threshold),
        MergeStrategy::Components => component_groups(matrix, threshold),
    }
}

fn greedy_groups(matrix: &SimilarityMatrix, threshold: f32) -> Vec<Vec<usize>> {
    let n = matrix.len();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut owner: Vec<Option<usize>> = vec![None; n];

    for i in 0..n {
        let local: Vec<usize> = std::iter::once(i)
            .chain(matrix.neighbours(i, threshold))
            .collect();

        let mut targets: Vec<usize> = local.iter().filter_map(|&m| owner[m]).collect();
        targets.sort_unstable();
        targets.dedup();

        let slot = match targets.first() {
            Some(&earliest) => earliest,
            None => {
                groups.push(Vec::new());
                groups.len() - 1
            }
        };

        // A local group that bridges several groups folds the later ones
        // into the earliest, so chains end up in a single group.
        for &later in targets.iter().skip(1) {
            let absorbed = std::mem::take(&mut groups[later]);
            for &m in &absorbed {
                owner[m] = Some(slot);
            }
            groups[slot].extend(absorbed);
        }

        for m in local {
            if owner[m].is_none() {
                owner[m] = Some(slot);
                groups[slot].push(m);
            }
        }
    }

    groups.retain(|g| g.len() >= 2);
    groups
}

fn component_groups(matrix: &SimilarityMatrix, threshold: f32) -> Vec<Vec<usize>> {
    let n = matrix.len();
    let mut sets = DisjointSets::new(n);
    for i in 0..n {
        for j in matrix.neighbours(i, threshold).filter(|&j| j > i) {
            sets.union(i, j);
        }
    }

    // Roots are the smallest index of their component, so bucketing in index
    // order yields groups ordered by reference.
    let mut slot_of_root: Vec<Option<usize>> = vec![None; n];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for i in 0..n {
        let root = sets.find(i);
        match slot_of_root[root] {
            Some(slot) => groups[slot].push(i),
            None => {
                slot_of_root[root] = Some(groups.len());
                groups.push(vec![i]);
            }
        }
    }

    groups.retain(|g| g.len() >= 2);
    groups
}

struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Deduplicate, embed in one batch, and group questions whose cosine
/// similarity reaches `options.threshold`.
///
/// Fewer than two unique questions give an empty result without calling the
/// embedder. Any provider failure aborts with no partial groups.
pub fn cluster_questions<E>(
    questions: &[Question],
    embedder: &E,
    options: &ClusterOptions,
) -> Result<QuestionGroups>
where
    E: EmbeddingProvider + ?Sized,
{
    options.validate()?;

    let unique = dedup_questions(questions);
    if unique.len() < 2 {
        debug!(unique = unique.len(), "not enough questions to cluster");
        return Ok(QuestionGroups::new());
    }

    let texts: Vec<String> = unique.iter().map(|q| q.text.clone()).collect();
    let embeddings = embedder
        .embed_batch(&texts)
        .map_err(QsimError::Provider)?;
    if embeddings.len() != texts.len() {
        return Err(QsimError::Provider(anyhow!(
            "provider returned {} vectors for {} questions",
            embeddings.len(),
            texts.len()
        )));
    }

    let matrix = SimilarityMatrix::compute(&embeddings);
    let index_groups = group_indices(&matrix, options.threshold, options.merge);

    info!(
        questions = questions.len(),
        unique = unique.len(),
        groups = index_groups.len(),
        threshold = options.threshold,
        merge = options.merge.as_str(),
        "clustered questions"
    );

    Ok(index_groups
        .iter()
        .filter_map(|members| {
            let (&reference, rest) = members.split_first()?;
            Some(QuestionGroup {
                reference: unique[reference].clone(),
                matches: rest
                    .iter()
                    .map(|&i| GroupMatch::new(&unique[i], matrix.get(reference, i)))
                    .collect(),
            })
        })
        .collect())
}
