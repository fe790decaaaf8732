use std::sync::Arc;

use crate::Result;

/// API shared by every tree in the engine: expressions, logical plans
/// and physical plans all implement [`TreeNode`] so that analyzer,
/// optimizer and planner rules can be phrased as small partial
/// functions applied with `transform_down` / `transform_up`.
///
/// Rebuilds are spine copies: `map_children` only reconstructs a node
/// when one of its children actually changed, which `Transformed`
/// tracks through the `transformed` flag.
pub trait TreeNode: Sized {
    /// Apply `f` to the node and then, recursively, to its children
    /// (pre-order). The returned [`TreeNodeRecursion`] can prune a
    /// subtree (`Jump`) or end the walk (`Stop`).
    fn apply<'n, F: FnMut(&'n Self) -> Result<TreeNodeRecursion>>(
        &'n self,
        mut f: F,
    ) -> Result<TreeNodeRecursion> {
        fn apply_impl<'n, N: TreeNode, F: FnMut(&'n N) -> Result<TreeNodeRecursion>>(
            node: &'n N,
            f: &mut F,
        ) -> Result<TreeNodeRecursion> {
            f(node)?.visit_children(|| node.apply_children(|c| apply_impl(c, f)))
        }
        apply_impl(self, &mut f)
    }

    /// Rewrite children first, then the node (post-order). Synonym of
    /// [`Self::transform_up`].
    fn transform<F: FnMut(Self) -> Result<Transformed<Self>>>(
        self,
        f: F,
    ) -> Result<Transformed<Self>> {
        self.transform_up(f)
    }

    /// Rewrite the node first, then its (possibly new) children
    /// (pre-order).
    fn transform_down<F: FnMut(Self) -> Result<Transformed<Self>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        fn transform_down_impl<N: TreeNode, F: FnMut(N) -> Result<Transformed<N>>>(
            node: N,
            f: &mut F,
        ) -> Result<Transformed<N>> {
            f(node)?.transform_children(|n| n.map_children(|c| transform_down_impl(c, f)))
        }
        transform_down_impl(self, &mut f)
    }

    /// Rewrite children first, then the node (post-order).
    fn transform_up<F: FnMut(Self) -> Result<Transformed<Self>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        fn transform_up_impl<N: TreeNode, F: FnMut(N) -> Result<Transformed<N>>>(
            node: N,
            f: &mut F,
        ) -> Result<Transformed<N>> {
            node.map_children(|c| transform_up_impl(c, f))?.transform_parent(f)
        }
        transform_up_impl(self, &mut f)
    }

    /// Combined pre-order (`f_down`) and post-order (`f_up`) rewrite in
    /// a single walk.
    fn transform_down_up<
        FD: FnMut(Self) -> Result<Transformed<Self>>,
        FU: FnMut(Self) -> Result<Transformed<Self>>,
    >(
        self,
        mut f_down: FD,
        mut f_up: FU,
    ) -> Result<Transformed<Self>> {
        fn transform_impl<
            N: TreeNode,
            FD: FnMut(N) -> Result<Transformed<N>>,
            FU: FnMut(N) -> Result<Transformed<N>>,
        >(
            node: N,
            f_down: &mut FD,
            f_up: &mut FU,
        ) -> Result<Transformed<N>> {
            f_down(node)?
                .transform_children(|n| n.map_children(|c| transform_impl(c, f_down, f_up)))?
                .transform_parent(f_up)
        }
        transform_impl(self, &mut f_down, &mut f_up)
    }

    /// True if `f` holds for any node of the tree. Stops at the first
    /// match.
    fn exists<F: FnMut(&Self) -> Result<bool>>(&self, mut f: F) -> Result<bool> {
        let mut found = false;
        self.apply(|n| {
            Ok(if f(n)? {
                found = true;
                TreeNodeRecursion::Stop
            } else {
                TreeNodeRecursion::Continue
            })
        })
        .map(|_| found)
    }

    /// Collect `f(x)` for every node `x` where `f` is defined, in
    /// pre-order.
    fn collect<T, F: FnMut(&Self) -> Option<T>>(&self, mut f: F) -> Result<Vec<T>> {
        let mut out = Vec::new();
        self.apply(|n| {
            if let Some(t) = f(n) {
                out.push(t);
            }
            Ok(TreeNodeRecursion::Continue)
        })?;
        Ok(out)
    }

    /// Low-level primitive: apply `f` to the node's direct children.
    /// Implementors provide this and [`Self::map_children`]; everything
    /// else derives from the two.
    fn apply_children<'n, F: FnMut(&'n Self) -> Result<TreeNodeRecursion>>(
        &'n self,
        f: F,
    ) -> Result<TreeNodeRecursion>;

    /// Low-level primitive: rewrite the node's direct children with `f`
    /// and rebuild the node only if one of them changed.
    fn map_children<F: FnMut(Self) -> Result<Transformed<Self>>>(
        self,
        f: F,
    ) -> Result<Transformed<Self>>;
}

/// Controls how a tree walk proceeds.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum TreeNodeRecursion {
    /// Continue with the next node.
    Continue,
    /// Skip the current subtree but keep walking siblings.
    Jump,
    /// End the walk.
    Stop,
}

impl TreeNodeRecursion {
    pub fn visit_children<F: FnOnce() -> Result<TreeNodeRecursion>>(
        self,
        f: F,
    ) -> Result<TreeNodeRecursion> {
        match self {
            TreeNodeRecursion::Continue => f(),
            TreeNodeRecursion::Jump => Ok(TreeNodeRecursion::Continue),
            TreeNodeRecursion::Stop => Ok(self),
        }
    }

    pub fn visit_sibling<F: FnOnce() -> Result<TreeNodeRecursion>>(
        self,
        f: F,
    ) -> Result<TreeNodeRecursion> {
        match self {
            TreeNodeRecursion::Continue | TreeNodeRecursion::Jump => f(),
            TreeNodeRecursion::Stop => Ok(self),
        }
    }
}

/// Result of a rewriting step: the new node, whether anything under it
/// changed, and how the surrounding walk should proceed.
#[derive(PartialEq, Debug)]
pub struct Transformed<T> {
    pub data: T,
    pub transformed: bool,
    pub tnr: TreeNodeRecursion,
}

impl<T> Transformed<T> {
    pub fn new(data: T, transformed: bool, tnr: TreeNodeRecursion) -> Self {
        Self { data, transformed, tnr }
    }

    /// `Transformed` with the given flag and recursion continuing.
    pub fn new_transformed(data: T, transformed: bool) -> Self {
        Self::new(data, transformed, TreeNodeRecursion::Continue)
    }

    /// Changed node, recursion continues.
    pub fn yes(data: T) -> Self {
        Self::new(data, true, TreeNodeRecursion::Continue)
    }

    /// Unchanged node, recursion continues.
    pub fn no(data: T) -> Self {
        Self::new(data, false, TreeNodeRecursion::Continue)
    }

    pub fn update_data<U, F: FnOnce(T) -> U>(self, f: F) -> Transformed<U> {
        Transformed::new(f(self.data), self.transformed, self.tnr)
    }

    pub fn map_data<U, F: FnOnce(T) -> Result<U>>(self, f: F) -> Result<Transformed<U>> {
        f(self.data).map(|data| Transformed::new(data, self.transformed, self.tnr))
    }

    pub fn transform_data<U, F: FnOnce(T) -> Result<Transformed<U>>>(
        self,
        f: F,
    ) -> Result<Transformed<U>> {
        f(self.data).map(|mut t| {
            t.transformed |= self.transformed;
            t
        })
    }

    pub fn transform_children<F: FnOnce(T) -> Result<Transformed<T>>>(
        mut self,
        f: F,
    ) -> Result<Transformed<T>> {
        match self.tnr {
            TreeNodeRecursion::Continue => {
                return f(self.data).map(|mut t| {
                    t.transformed |= self.transformed;
                    t
                });
            }
            TreeNodeRecursion::Jump => {
                self.tnr = TreeNodeRecursion::Continue;
            }
            TreeNodeRecursion::Stop => {}
        }
        Ok(self)
    }

    pub fn transform_sibling<F: FnOnce(T) -> Result<Transformed<T>>>(
        self,
        f: F,
    ) -> Result<Transformed<T>> {
        match self.tnr {
            TreeNodeRecursion::Continue | TreeNodeRecursion::Jump => f(self.data).map(|mut t| {
                t.transformed |= self.transformed;
                t
            }),
            TreeNodeRecursion::Stop => Ok(self),
        }
    }

    pub fn transform_parent<F: FnOnce(T) -> Result<Transformed<T>>>(
        self,
        f: F,
    ) -> Result<Transformed<T>> {
        match self.tnr {
            TreeNodeRecursion::Continue => f(self.data).map(|mut t| {
                t.transformed |= self.transformed;
                t
            }),
            TreeNodeRecursion::Jump | TreeNodeRecursion::Stop => Ok(self),
        }
    }
}

/// A container of sibling tree nodes (child vectors, optional children,
/// expression pairs). `apply_children`/`map_children` implementations
/// delegate here so the sibling continuation rules live in one place.
pub trait TreeNodeContainer<'a, T: 'a>: Sized {
    fn apply_elements<F: FnMut(&'a T) -> Result<TreeNodeRecursion>>(
        &'a self,
        f: F,
    ) -> Result<TreeNodeRecursion>;

    fn map_elements<F: FnMut(T) -> Result<Transformed<T>>>(
        self,
        f: F,
    ) -> Result<Transformed<Self>>;
}

impl<'a, T: 'a, C: TreeNodeContainer<'a, T>> TreeNodeContainer<'a, T> for Box<C> {
    fn apply_elements<F: FnMut(&'a T) -> Result<TreeNodeRecursion>>(
        &'a self,
        f: F,
    ) -> Result<TreeNodeRecursion> {
        self.as_ref().apply_elements(f)
    }

    fn map_elements<F: FnMut(T) -> Result<Transformed<T>>>(
        self,
        f: F,
    ) -> Result<Transformed<Self>> {
        (*self).map_elements(f)?.map_data(|c| Ok(Self::new(c)))
    }
}

impl<'a, T: 'a, C: TreeNodeContainer<'a, T> + Clone> TreeNodeContainer<'a, T> for Arc<C> {
    fn apply_elements<F: FnMut(&'a T) -> Result<TreeNodeRecursion>>(
        &'a self,
        f: F,
    ) -> Result<TreeNodeRecursion> {
        self.as_ref().apply_elements(f)
    }

    fn map_elements<F: FnMut(T) -> Result<Transformed<T>>>(
        self,
        f: F,
    ) -> Result<Transformed<Self>> {
        Arc::unwrap_or_clone(self).map_elements(f)?.map_data(|c| Ok(Arc::new(c)))
    }
}

impl<'a, T: 'a, C: TreeNodeContainer<'a, T>> TreeNodeContainer<'a, T> for Option<C> {
    fn apply_elements<F: FnMut(&'a T) -> Result<TreeNodeRecursion>>(
        &'a self,
        f: F,
    ) -> Result<TreeNodeRecursion> {
        match self {
            Some(t) => t.apply_elements(f),
            None => Ok(TreeNodeRecursion::Continue),
        }
    }

    fn map_elements<F: FnMut(T) -> Result<Transformed<T>>>(
        self,
        f: F,
    ) -> Result<Transformed<Self>> {
        self.map_or(Ok(Transformed::no(None)), |c| {
            c.map_elements(f)?.map_data(|c| Ok(Some(c)))
        })
    }
}

impl<'a, T: 'a, C: TreeNodeContainer<'a, T>> TreeNodeContainer<'a, T> for Vec<C> {
    fn apply_elements<F: FnMut(&'a T) -> Result<TreeNodeRecursion>>(
        &'a self,
        mut f: F,
    ) -> Result<TreeNodeRecursion> {
        let mut tnr = TreeNodeRecursion::Continue;
        for c in self {
            tnr = c.apply_elements(&mut f)?;
            if tnr == TreeNodeRecursion::Stop {
                return Ok(TreeNodeRecursion::Stop);
            }
        }
        Ok(tnr)
    }

    fn map_elements<F: FnMut(T) -> Result<Transformed<T>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        let mut tnr = TreeNodeRecursion::Continue;
        let mut transformed = false;
        self.into_iter()
            .map(|c| match tnr {
                TreeNodeRecursion::Continue | TreeNodeRecursion::Jump => {
                    c.map_elements(&mut f).map(|result| {
                        tnr = result.tnr;
                        transformed |= result.transformed;
                        result.data
                    })
                }
                TreeNodeRecursion::Stop => Ok(c),
            })
            .collect::<Result<Vec<_>>>()
            .map(|data| Transformed::new(data, transformed, tnr))
    }
}

impl<'a, T: 'a, C0: TreeNodeContainer<'a, T>, C1: TreeNodeContainer<'a, T>> TreeNodeContainer<'a, T>
    for (C0, C1)
{
    fn apply_elements<F: FnMut(&'a T) -> Result<TreeNodeRecursion>>(
        &'a self,
        mut f: F,
    ) -> Result<TreeNodeRecursion> {
        self.0
            .apply_elements(&mut f)?
            .visit_sibling(|| self.1.apply_elements(&mut f))
    }

    fn map_elements<F: FnMut(T) -> Result<Transformed<T>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        self.0
            .map_elements(&mut f)?
            .map_data(|new_c0| Ok((new_c0, self.1)))?
            .transform_sibling(|(new_c0, c1)| {
                c1.map_elements(&mut f)?.map_data(|new_c1| Ok((new_c0, new_c1)))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct TestNode {
        no: i32,
        children: Vec<TestNode>,
    }

    impl TestNode {
        fn leaf(no: i32) -> Self {
            TestNode { no, children: vec![] }
        }
        fn node(no: i32, children: Vec<TestNode>) -> Self {
            TestNode { no, children }
        }
    }

    impl<'a> TreeNodeContainer<'a, Self> for TestNode {
        fn apply_elements<F: FnMut(&'a Self) -> Result<TreeNodeRecursion>>(
            &'a self,
            mut f: F,
        ) -> Result<TreeNodeRecursion> {
            f(self)
        }

        fn map_elements<F: FnMut(Self) -> Result<Transformed<Self>>>(
            self,
            mut f: F,
        ) -> Result<Transformed<Self>> {
            f(self)
        }
    }

    impl TreeNode for TestNode {
        fn apply_children<'n, F: FnMut(&'n Self) -> Result<TreeNodeRecursion>>(
            &'n self,
            f: F,
        ) -> Result<TreeNodeRecursion> {
            self.children.apply_elements(f)
        }

        fn map_children<F: FnMut(Self) -> Result<Transformed<Self>>>(
            self,
            f: F,
        ) -> Result<Transformed<Self>> {
            self.children
                .map_elements(f)?
                .map_data(|children| Ok(TestNode { no: self.no, children }))
        }
    }

    ///         1
    ///         2
    ///     3       4
    ///   5   6   7   8
    fn build_tree() -> TestNode {
        TestNode::node(
            1,
            vec![TestNode::node(
                2,
                vec![
                    TestNode::node(3, vec![TestNode::leaf(5), TestNode::leaf(6)]),
                    TestNode::node(4, vec![TestNode::leaf(7), TestNode::leaf(8)]),
                ],
            )],
        )
    }

    #[test]
    fn test_apply_preorder() {
        let node = build_tree();
        let mut visited = Vec::new();
        node.apply(|n| {
            visited.push(n.no);
            Ok(TreeNodeRecursion::Continue)
        })
        .unwrap();
        assert_eq!(visited, vec![1, 2, 3, 5, 6, 4, 7, 8]);
    }

    #[test]
    fn test_apply_jump_and_stop() {
        let node = build_tree();
        let mut visited = Vec::new();
        node.apply(|n| {
            visited.push(n.no);
            if n.no == 3 {
                Ok(TreeNodeRecursion::Jump)
            } else if n.no == 7 {
                Ok(TreeNodeRecursion::Stop)
            } else {
                Ok(TreeNodeRecursion::Continue)
            }
        })
        .unwrap();
        // 3 prunes its children, 7 ends the walk
        assert_eq!(visited, vec![1, 2, 3, 4, 7]);
    }

    #[test]
    fn test_transform_up() {
        let node = build_tree();
        let result = node
            .transform_up(|mut n| {
                n.no *= 10;
                Ok(Transformed::yes(n))
            })
            .unwrap();
        assert!(result.transformed);
        assert_eq!(result.data.no, 10);
        assert_eq!(result.data.children[0].children[1].children[0].no, 70);
    }

    #[test]
    fn test_identity_transform_reports_unchanged() {
        let node = build_tree();
        let expected = node.clone();
        let result = node.transform_up(|n| Ok(Transformed::no(n))).unwrap();
        assert!(!result.transformed);
        assert_eq!(result.data, expected);
    }

    #[test]
    fn test_exists_and_collect() {
        let node = build_tree();
        assert!(node.exists(|n| Ok(n.no == 6)).unwrap());
        assert!(!node.exists(|n| Ok(n.no == 42)).unwrap());
        let leaves = node
            .collect(|n| if n.children.is_empty() { Some(n.no) } else { None })
            .unwrap();
        assert_eq!(leaves, vec![5, 6, 7, 8]);
    }
}
