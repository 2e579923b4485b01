/// LightGBM text-model evaluator
///
/// Reads the `model_file` dump written by `Booster.save_model()` (the
/// LambdaMART artifact) and evaluates it natively. Only numerical splits are
/// supported; categorical splits are rejected at load time.
use super::model::ScoringArtifact;
use crate::error::Result;
use std::collections::HashMap;

const CATEGORICAL_MASK: u8 = 1;
const DEFAULT_LEFT_MASK: u8 = 2;
const ZERO_THRESHOLD: f64 = 1e-35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingType {
    None,
    Zero,
    NaN,
}

impl MissingType {
    fn from_decision_type(decision_type: u8) -> Self {
        match (decision_type >> 2) & 3 {
            1 => MissingType::Zero,
            2 => MissingType::NaN,
            _ => MissingType::None,
        }
    }
}

#[derive(Debug, Clone)]
struct Tree {
    split_feature: Vec<usize>,
    threshold: Vec<f64>,
    decision_type: Vec<u8>,
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    leaf_value: Vec<f64>,
}

impl Tree {
    fn predict(&self, features: &[f32]) -> f64 {
        if self.split_feature.is_empty() {
            return self.leaf_value[0];
        }

        let mut node: i32 = 0;
        // Acyclicity is checked at parse time, so this walk always reaches a leaf.
        loop {
            let n = node as usize;
            let value = f64::from(features[self.split_feature[n]]);
            node = self.decide(n, value);
            if node < 0 {
                return self.leaf_value[(!node) as usize];
            }
        }
    }

    fn decide(&self, node: usize, mut value: f64) -> i32 {
        let decision_type = self.decision_type[node];
        let missing = MissingType::from_decision_type(decision_type);

        if value.is_nan() && missing != MissingType::NaN {
            value = 0.0;
        }

        let is_missing = match missing {
            MissingType::Zero => value.abs() <= ZERO_THRESHOLD,
            MissingType::NaN => value.is_nan(),
            MissingType::None => false,
        };

        let go_left = if is_missing {
            decision_type & DEFAULT_LEFT_MASK != 0
        } else {
            value <= self.threshold[node]
        };

        if go_left {
            self.left_child[node]
        } else {
            self.right_child[node]
        }
    }
}

/// Gradient boosted tree ensemble loaded from a LightGBM text dump.
#[derive(Debug, Clone)]
pub struct GbdtArtifact {
    trees: Vec<Tree>,
    num_features: usize,
    feature_names: Vec<String>,
    objective: String,
    sigmoid: Option<f64>,
}

impl GbdtArtifact {
    /// Parse a LightGBM text model.
    ///
    /// Returns a plain message on failure; the loader attaches model and path.
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut lines = text.lines().map(str::trim).peekable();

        let mut header: HashMap<&str, &str> = HashMap::new();
        while let Some(line) = lines.peek() {
            if line.starts_with("Tree=") || *line == "end of trees" {
                break;
            }
            if let Some((key, value)) = line.split_once('=') {
                header.insert(key, value);
            }
            lines.next();
        }

        let max_feature_idx: usize = header
            .get("max_feature_idx")
            .ok_or("missing max_feature_idx header")?
            .parse::<usize>()
            .map_err(|e| format!("invalid max_feature_idx: {}", e))?;
        let num_features = max_feature_idx + 1;

        if let Some(num_class) = header.get("num_class") {
            if *num_class != "1" {
                return Err(format!(
                    "multiclass models are not supported (num_class={})",
                    num_class
                ));
            }
        }

        let feature_names: Vec<String> = header
            .get("feature_names")
            .map(|names| names.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        if !feature_names.is_empty() && feature_names.len() != num_features {
            return Err(format!(
                "feature_names lists {} names but max_feature_idx implies {}",
                feature_names.len(),
                num_features
            ));
        }

        let objective = header.get("objective").copied().unwrap_or("regression");
        let sigmoid = Self::sigmoid_param(objective)?;

        let mut trees = Vec::new();
        let mut block: HashMap<&str, &str> = HashMap::new();
        let mut in_tree = false;

        for line in lines {
            if line.starts_with("Tree=") {
                if in_tree {
                    trees.push(Self::parse_tree(&block, num_features, trees.len())?);
                    block.clear();
                }
                in_tree = true;
                continue;
            }
            if line == "end of trees" {
                break;
            }
            if in_tree {
                if let Some((key, value)) = line.split_once('=') {
                    block.insert(key, value);
                }
            }
        }
        if in_tree {
            trees.push(Self::parse_tree(&block, num_features, trees.len())?);
        }

        if trees.is_empty() {
            return Err("model contains no trees".to_string());
        }

        Ok(Self {
            trees,
            num_features,
            feature_names,
            objective: objective.split_whitespace().next().unwrap_or("").to_string(),
            sigmoid,
        })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    fn sigmoid_param(objective: &str) -> std::result::Result<Option<f64>, String> {
        let mut parts = objective.split_whitespace();
        let name = parts.next().unwrap_or("");
        if name != "binary" && name != "cross_entropy" {
            return Ok(None);
        }

        let mut sigmoid = 1.0;
        for part in parts {
            if let Some(value) = part.strip_prefix("sigmoid:") {
                sigmoid = value
                    .parse::<f64>()
                    .map_err(|e| format!("invalid sigmoid parameter: {}", e))?;
            }
        }
        Ok(Some(sigmoid))
    }

    fn parse_tree(
        block: &HashMap<&str, &str>,
        num_features: usize,
        index: usize,
    ) -> std::result::Result<Tree, String> {
        let context = |msg: String| format!("tree {}: {}", index, msg);

        let num_leaves: usize = field(block, "num_leaves")
            .and_then(|v| {
                v.parse::<usize>()
                    .map_err(|e| format!("invalid num_leaves: {}", e))
            })
            .map_err(context)?;
        if num_leaves == 0 {
            return Err(context("num_leaves must be positive".to_string()));
        }

        let leaf_value: Vec<f64> = parse_list(block, "leaf_value").map_err(context)?;
        if leaf_value.len() != num_leaves {
            return Err(context(format!(
                "expected {} leaf values, found {}",
                num_leaves,
                leaf_value.len()
            )));
        }

        if num_leaves == 1 {
            return Ok(Tree {
                split_feature: vec![],
                threshold: vec![],
                decision_type: vec![],
                left_child: vec![],
                right_child: vec![],
                leaf_value,
            });
        }

        let internal = num_leaves - 1;
        let split_feature: Vec<usize> = parse_list(block, "split_feature").map_err(context)?;
        let threshold: Vec<f64> = parse_list(block, "threshold").map_err(context)?;
        let decision_type: Vec<u8> = parse_list(block, "decision_type").map_err(context)?;
        let left_child: Vec<i32> = parse_list(block, "left_child").map_err(context)?;
        let right_child: Vec<i32> = parse_list(block, "right_child").map_err(context)?;

        for (name, len) in [
            ("split_feature", split_feature.len()),
            ("threshold", threshold.len()),
            ("decision_type", decision_type.len()),
            ("left_child", left_child.len()),
            ("right_child", right_child.len()),
        ] {
            if len != internal {
                return Err(context(format!(
                    "{} has {} entries, expected {}",
                    name, len, internal
                )));
            }
        }

        if let Some(feature) = split_feature.iter().find(|&&f| f >= num_features) {
            return Err(context(format!(
                "split on feature {} but model has {} features",
                feature, num_features
            )));
        }
        if decision_type.iter().any(|&d| d & CATEGORICAL_MASK != 0) {
            return Err(context("categorical splits are not supported".to_string()));
        }

        let tree = Tree {
            split_feature,
            threshold,
            decision_type,
            left_child,
            right_child,
            leaf_value,
        };
        Self::check_structure(&tree, internal, num_leaves).map_err(context)?;

        Ok(tree)
    }

    /// Every child index must be in range and every node reachable exactly once.
    fn check_structure(
        tree: &Tree,
        internal: usize,
        num_leaves: usize,
    ) -> std::result::Result<(), String> {
        let mut seen_internal = vec![false; internal];
        let mut seen_leaf = vec![false; num_leaves];
        let mut stack = vec![0i32];

        while let Some(node) = stack.pop() {
            if node < 0 {
                let leaf = (!node) as usize;
                if leaf >= num_leaves || std::mem::replace(&mut seen_leaf[leaf], true) {
                    return Err(format!("invalid leaf reference {}", node));
                }
                continue;
            }
            let n = node as usize;
            if n >= internal || std::mem::replace(&mut seen_internal[n], true) {
                return Err(format!("invalid node reference {}", node));
            }
            stack.push(tree.left_child[n]);
            stack.push(tree.right_child[n]);
        }

        Ok(())
    }
}

impl ScoringArtifact for GbdtArtifact {
    fn input_width(&self) -> usize {
        self.num_features
    }

    fn feature_names(&self) -> Option<&[String]> {
        if self.feature_names.is_empty() {
            None
        } else {
            Some(&self.feature_names)
        }
    }

    fn format(&self) -> &'static str {
        "lightgbm"
    }

    fn predict(&self, features: &[f32]) -> Result<f32> {
        let raw: f64 = self.trees.iter().map(|tree| tree.predict(features)).sum();
        let score = match self.sigmoid {
            Some(sigmoid) => 1.0 / (1.0 + (-sigmoid * raw).exp()),
            None => raw,
        };
        Ok(score as f32)
    }
}

fn field<'a>(block: &HashMap<&str, &'a str>, key: &str) -> std::result::Result<&'a str, String> {
    block
        .get(key)
        .copied()
        .ok_or_else(|| format!("missing {}", key))
}

fn parse_list<T>(block: &HashMap<&str, &str>, key: &str) -> std::result::Result<Vec<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    field(block, key)?
        .split_whitespace()
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|e| format!("invalid {} entry '{}': {}", key, token, e))
        })
        .collect()
}
