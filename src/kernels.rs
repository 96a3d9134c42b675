use crate::backend::Transpose;

/// Operands of one `dgemm` call, shared by every row block.
pub(crate) struct Gemm<'a> {
    pub(crate) transa: Transpose,
    pub(crate) transb: Transpose,
    pub(crate) n: usize,
    pub(crate) k: usize,
    pub(crate) alpha: f64,
    pub(crate) a: &'a [f64],
    pub(crate) lda: usize,
    pub(crate) b: &'a [f64],
    pub(crate) ldb: usize,
    pub(crate) beta: f64,
    pub(crate) ldc: usize,
}

impl<'a> Gemm<'a> {
    #[inline(always)]
    fn a_at(&self, i: usize, l: usize) -> f64 {
        match self.transa {
            Transpose::None => self.a[i * self.lda + l],
            Transpose::Ordinary => self.a[l * self.lda + i],
        }
    }
}

/// Computes the rows of `c` starting at `row0`. `c` begins at that row and every row but
/// the last spans `ldc` elements.
pub(crate) fn dgemm_rows(g: &Gemm<'_>, row0: usize, c: &mut [f64]) {
    for (r, c_row) in c.chunks_mut(g.ldc).enumerate() {
        let i = row0 + r;
        let c_row = &mut c_row[..g.n];
        if g.beta == 0.0 {
            c_row.iter_mut().for_each(|x| *x = 0.0);
        } else if g.beta != 1.0 {
            c_row.iter_mut().for_each(|x| *x *= g.beta);
        }
        if g.alpha == 0.0 {
            continue;
        }
        for l in 0..g.k {
            let a_il = g.alpha * g.a_at(i, l);
            match g.transb {
                Transpose::None => {
                    let b_row = &g.b[l * g.ldb..l * g.ldb + g.n];
                    for (x, &b_lj) in c_row.iter_mut().zip(b_row) {
                        *x += a_il * b_lj;
                    }
                }
                Transpose::Ordinary => {
                    for (j, x) in c_row.iter_mut().enumerate() {
                        *x += a_il * g.b[j * g.ldb + l];
                    }
                }
            }
        }
    }
}

pub(crate) fn dscal(n: usize, alpha: f64, x: &mut [f64], incx: usize) {
    if incx == 1 {
        x[..n].iter_mut().for_each(|v| *v *= alpha);
    } else {
        x.iter_mut().step_by(incx).take(n).for_each(|v| *v *= alpha);
    }
}
