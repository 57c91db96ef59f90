//! Fused chains of row-wise operators.

use std::fmt;

use lumen_plane::{AccumBuffer, Plane};

use crate::error::ScanError;
use crate::kernel::{RowKernel, Shape};

/// Where a member input comes from.
#[derive(Clone, Debug)]
pub enum Source {
    /// The row produced by an earlier member.
    Member(usize),
    /// The current row of a plane.
    Plane(Plane),
    /// Any row of a plane, for [`Shape::ManyToOne`] kernels.
    PlaneRows(Plane),
    /// The current row of an accumulation buffer.
    Accum(AccumBuffer),
    /// A constant.
    Scalar(f64),
}

/// One operator in a fused chain.
pub struct Member {
    name: String,
    sources: Vec<Source>,
    output: Option<usize>,
    kernel: Option<Box<dyn RowKernel>>,
}

impl Member {
    /// Operator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inputs in declaration order.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Output slot this member writes, if any.
    pub fn output(&self) -> Option<usize> {
        self.output
    }

    /// Whether a kernel is bound.
    pub fn is_bound(&self) -> bool {
        self.kernel.is_some()
    }

    pub(crate) fn kernel(&self) -> Option<&dyn RowKernel> {
        self.kernel.as_deref()
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("sources", &self.sources.len())
            .field("output", &self.output)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// A validated fused chain: members in dependency order, each reading
/// earlier members, planes, accumulation buffers or scalars, some of
/// them bound to output slots.
#[derive(Debug)]
pub struct Subgroup {
    members: Vec<Member>,
    outputs: usize,
    /// `consumers[i]` lists `(member, source slot)` pairs reading member `i`.
    consumers: Vec<Vec<(usize, usize)>>,
}

impl Subgroup {
    /// Start building a chain.
    pub fn builder() -> SubgroupBuilder {
        SubgroupBuilder::default()
    }

    /// Members in dependency order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Number of output slots.
    pub fn output_count(&self) -> usize {
        self.outputs
    }

    /// Readers of member `index`'s row.
    pub fn consumers(&self, index: usize) -> &[(usize, usize)] {
        &self.consumers[index]
    }

    /// Bind (or replace) the kernel of member `index`.
    pub fn bind(&mut self, index: usize, kernel: Box<dyn RowKernel>) -> Result<(), ScanError> {
        let member = self.members.get_mut(index).ok_or_else(|| ScanError::Subgroup {
            reason: format!("no member {index}"),
        })?;
        check_shape(&member.name, kernel.as_ref(), &member.sources)?;
        member.kernel = Some(kernel);
        Ok(())
    }

    /// Fail unless every member has a kernel.
    pub(crate) fn check_bound(&self) -> Result<(), ScanError> {
        match self.members.iter().find(|m| !m.is_bound()) {
            Some(m) => Err(ScanError::Subgroup {
                reason: format!("member '{}' has no kernel bound", m.name),
            }),
            None => Ok(()),
        }
    }
}

fn check_shape(name: &str, kernel: &dyn RowKernel, sources: &[Source]) -> Result<(), ScanError> {
    let has_rows = sources.iter().any(|s| matches!(s, Source::PlaneRows(_)));
    if kernel.shape() == Shape::ManyToOne && !has_rows {
        return Err(ScanError::Subgroup {
            reason: format!("N-to-1 member '{name}' needs a plane-rows source"),
        });
    }
    Ok(())
}

/// Builder for a [`Subgroup`].
///
/// # Example
///
/// A two-member chain where the second member reads the first:
///
/// ```ignore
/// let mut b = Subgroup::builder();
/// let grad = b.add_kernel(Box::new(GradientX), vec![Source::Plane(src)]);
/// let scaled = b.add_kernel(Box::new(Scale), vec![Source::Member(grad), Source::Scalar(0.5)]);
/// b.mark_output(scaled)?;
/// let subgroup = b.build()?;
/// ```
#[derive(Default)]
pub struct SubgroupBuilder {
    members: Vec<Member>,
    outputs: usize,
}

impl SubgroupBuilder {
    /// Add an unbound member; bind its kernel later with
    /// [`Subgroup::bind`]. Returns the member index.
    pub fn add(&mut self, name: impl Into<String>, sources: Vec<Source>) -> usize {
        self.members.push(Member {
            name: name.into(),
            sources,
            output: None,
            kernel: None,
        });
        self.members.len() - 1
    }

    /// Add a member with its kernel bound. Returns the member index.
    pub fn add_kernel(&mut self, kernel: Box<dyn RowKernel>, sources: Vec<Source>) -> usize {
        let index = self.add(kernel.name().to_string(), sources);
        self.members[index].kernel = Some(kernel);
        index
    }

    /// Route member `index` to the next output slot. Returns the slot.
    pub fn mark_output(&mut self, index: usize) -> Result<usize, ScanError> {
        let member = self.members.get_mut(index).ok_or_else(|| ScanError::Subgroup {
            reason: format!("no member {index}"),
        })?;
        if member.output.is_some() {
            return Err(ScanError::Subgroup {
                reason: format!("member '{}' is already an output", member.name),
            });
        }
        member.output = Some(self.outputs);
        self.outputs += 1;
        Ok(self.outputs - 1)
    }

    /// Validate and freeze the chain.
    pub fn build(self) -> Result<Subgroup, ScanError> {
        if self.members.is_empty() {
            return Err(ScanError::Subgroup {
                reason: "no members".into(),
            });
        }
        if self.outputs == 0 {
            return Err(ScanError::Subgroup {
                reason: "no member is marked as an output".into(),
            });
        }
        let mut consumers = vec![Vec::new(); self.members.len()];
        for (i, member) in self.members.iter().enumerate() {
            for (slot, source) in member.sources.iter().enumerate() {
                if let Source::Member(j) = *source {
                    if j >= i {
                        return Err(ScanError::Subgroup {
                            reason: format!(
                                "member '{}' reads member {j}, which does not precede it",
                                member.name
                            ),
                        });
                    }
                    consumers[j].push((i, slot));
                }
            }
            if let Some(kernel) = &member.kernel {
                check_shape(&member.name, kernel.as_ref(), &member.sources)?;
            }
        }
        Ok(Subgroup {
            members: self.members,
            outputs: self.outputs,
            consumers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;
    use crate::kernel::RowArgs;

    struct Noop(Shape);

    impl RowKernel for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn shape(&self) -> Shape {
            self.0
        }

        fn run(&self, _: &RowArgs<'_>, _: &mut [f32]) -> Result<(), KernelError> {
            Ok(())
        }
    }

    #[test]
    fn consumers_are_indexed_by_producer() {
        let mut b = Subgroup::builder();
        let a = b.add_kernel(Box::new(Noop(Shape::OneToOne)), vec![Source::Scalar(1.0)]);
        let c = b.add_kernel(
            Box::new(Noop(Shape::OneToOne)),
            vec![Source::Member(a), Source::Scalar(2.0), Source::Member(a)],
        );
        b.mark_output(c).unwrap();
        let g = b.build().unwrap();
        assert_eq!(g.consumers(a), &[(1, 0), (1, 2)]);
        assert!(g.consumers(c).is_empty());
        assert_eq!(g.output_count(), 1);
    }

    #[test]
    fn forward_reference_is_rejected() {
        let mut b = Subgroup::builder();
        let a = b.add("a", vec![Source::Member(0)]);
        b.mark_output(a).unwrap();
        assert!(matches!(b.build(), Err(ScanError::Subgroup { .. })));
    }

    #[test]
    fn missing_output_is_rejected() {
        let mut b = Subgroup::builder();
        b.add("a", vec![]);
        assert!(b.build().is_err());
        assert!(Subgroup::builder().build().is_err());
    }

    #[test]
    fn double_output_is_rejected() {
        let mut b = Subgroup::builder();
        let a = b.add("a", vec![]);
        assert_eq!(b.mark_output(a).unwrap(), 0);
        assert!(b.mark_output(a).is_err());
    }

    #[test]
    fn late_binding_checks_shape_and_completeness() {
        let mut b = Subgroup::builder();
        let a = b.add("vertical", vec![Source::Scalar(1.0)]);
        b.mark_output(a).unwrap();
        let mut g = b.build().unwrap();
        assert!(g.check_bound().is_err());
        assert!(g.bind(a, Box::new(Noop(Shape::ManyToOne))).is_err());
        g.bind(a, Box::new(Noop(Shape::OneToOne))).unwrap();
        assert!(g.check_bound().is_ok());
        assert!(g.members()[a].is_bound());
        assert_eq!(g.members()[a].name(), "vertical");
    }
}
