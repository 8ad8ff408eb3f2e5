// 演示数据：系统用户与公开的 Fundamentals 题单

use crate::error::AppError;
use crate::models::Difficulty::{self, Easy, Medium};
use crate::services::{hash_password, DatabaseService, NewList, NewProblem};

pub const SYSTEM_USERNAME: &str = "system";
pub const SYSTEM_PASSWORD: &str = "system123456";

const LIST_NAME: &str = "Fundamentals";
const LIST_DESCRIPTION: &str = "Essential algorithmic patterns and data structures. \
    Master these 18 problems to build a solid foundation for coding interviews.";

struct SeedProblem {
    title: &'static str,
    difficulty: Difficulty,
    tags: &'static [&'static str],
    slug: &'static str,
    description: &'static str,
}

const fn problem(
    title: &'static str,
    difficulty: Difficulty,
    tags: &'static [&'static str],
    slug: &'static str,
    description: &'static str,
) -> SeedProblem {
    SeedProblem {
        title,
        difficulty,
        tags,
        slug,
        description,
    }
}

const CATALOGUE: &[SeedProblem] = &[
    problem("Range Sum Query - Immutable", Easy, &["array", "prefix-sum"], "range-sum-query-immutable", "LeetCode 303 - Prefix Sum pattern"),
    problem("Valid Palindrome", Easy, &["string", "two-pointers"], "valid-palindrome", "LeetCode 125 - Two pointers pattern"),
    problem("Maximum Average Subarray I", Easy, &["array", "sliding-window"], "maximum-average-subarray-i", "LeetCode 643 - Sliding window pattern"),
    problem("Linked List Cycle", Easy, &["linked-list", "two-pointers"], "linked-list-cycle", "LeetCode 141 - Fast and Slow pointer pattern"),
    problem("Reverse Linked List", Easy, &["linked-list", "recursion"], "reverse-linked-list", "LeetCode 206 - In-place Reversal pattern"),
    problem("Next Greater Element I", Easy, &["array", "stack", "monotonic-stack"], "next-greater-element-i", "LeetCode 496 - Stack pattern"),
    problem("Kth Largest Element in an Array", Medium, &["array", "heap", "quickselect"], "kth-largest-element-in-an-array", "LeetCode 215 - Top K Elements pattern"),
    problem("Merge Intervals", Medium, &["array", "sorting"], "merge-intervals", "LeetCode 56 - Overlapping Intervals pattern"),
    problem("Binary Search", Easy, &["array", "binary-search"], "binary-search", "LeetCode 704 - Binary Search pattern"),
    problem("Search in Rotated Sorted Array", Medium, &["array", "binary-search"], "search-in-rotated-sorted-array", "LeetCode 33 - Modified Binary Search pattern"),
    problem("Binary Tree Preorder Traversal", Easy, &["tree", "binary-tree", "dfs"], "binary-tree-preorder-traversal", "LeetCode 144 - Binary Tree Traversal pattern"),
    problem("Binary Tree Inorder Traversal", Easy, &["tree", "binary-tree", "dfs"], "binary-tree-inorder-traversal", "LeetCode 94 - Binary Tree Traversal pattern"),
    problem("Number of Islands", Medium, &["array", "dfs", "bfs", "matrix"], "number-of-islands", "LeetCode 200 - Depth First Search pattern"),
    problem("Binary Tree Level Order Traversal", Medium, &["tree", "binary-tree", "bfs"], "binary-tree-level-order-traversal", "LeetCode 102 - Breadth First Search pattern"),
    problem("Flood Fill", Easy, &["array", "dfs", "bfs", "matrix"], "flood-fill", "LeetCode 733 - Matrix Traversal pattern"),
    problem("Subsets", Medium, &["array", "backtracking"], "subsets", "LeetCode 78 - Backtracking pattern"),
    problem("Climbing Stairs", Easy, &["dynamic-programming", "math"], "climbing-stairs", "LeetCode 70 - Fibonacci / Dynamic Programming pattern"),
    problem("House Robber", Medium, &["array", "dynamic-programming"], "house-robber", "LeetCode 198 - Dynamic Programming pattern"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    /// 已存在系统用户，未做任何修改
    AlreadySeeded,
    Created { list_id: i64, problems: usize },
}

/// 写入演示数据；系统用户已存在时直接跳过
pub fn seed_fundamentals(db: &DatabaseService) -> Result<SeedOutcome, AppError> {
    if db.find_user_by_username(SYSTEM_USERNAME)?.is_some() {
        log::info!("system user already exists, skipping seed");
        return Ok(SeedOutcome::AlreadySeeded);
    }

    let system = db.create_user(SYSTEM_USERNAME, &hash_password(SYSTEM_PASSWORD)?)?;
    let list = db.create_list(
        Some(&system.id),
        NewList::new(LIST_NAME, Some(LIST_DESCRIPTION), true)?,
    )?;
    log::info!("created list {} ({})", list.name, list.id);

    for (i, seed) in CATALOGUE.iter().enumerate() {
        let new_problem = NewProblem::new(
            list.id,
            seed.title,
            Some(seed.description),
            seed.difficulty,
            seed.tags.iter().map(|t| t.to_string()).collect(),
            Some(&format!("https://leetcode.com/problems/{}/", seed.slug)),
        )?;
        db.create_problem(Some(&system.id), new_problem)?;
        log::info!("  {}. {} ({})", i + 1, seed.title, seed.difficulty.as_str());
    }

    Ok(SeedOutcome::Created {
        list_id: list.id,
        problems: CATALOGUE.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_idempotent() {
        let db = DatabaseService::open_in_memory().unwrap();

        let outcome = seed_fundamentals(&db).unwrap();
        let SeedOutcome::Created { list_id, problems } = outcome else {
            panic!("expected fresh seed, got {outcome:?}");
        };
        assert_eq!(problems, 18);

        let list = db.get_list_with_problems(list_id, None).unwrap();
        assert!(list.list.is_public);
        assert_eq!(list.problems.len(), 18);
        assert_eq!(list.problems[0].title, "Range Sum Query - Immutable");
        assert_eq!(list.problems[17].rank, 17);
        assert_eq!(
            list.problems[7].external_url.as_deref(),
            Some("https://leetcode.com/problems/merge-intervals/")
        );

        assert_eq!(seed_fundamentals(&db).unwrap(), SeedOutcome::AlreadySeeded);
        assert_eq!(db.list_visible_lists(None).unwrap().len(), 1);
    }
}
