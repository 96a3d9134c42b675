use log::info;
use matrix::io::{read_matrices_from_binary, write_matrices_to_binary};
use matrix::lapack::{diagonalize_sym_matrix, invert_gen_matrix, set_matrix_random_orthogonal};
use matrix::{matrix, mult_dgemm, mult_dgemm_atba, MResult, Matrix, Uplo};

fn main() -> MResult<()> {
    env_logger::init();

    let a = matrix![[1, 2, 3], [4, 5, 6]]?;
    let b = matrix![[1, 0], [0, 1], [1, 1]]?;
    let ab = mult_dgemm(&a, &b)?;
    info!("a * b =\n{}", ab);

    let mut s = Matrix::new(2, 2)?;
    s.append(4.0)?.append(1.0)?.append(1.0)?.append(3.0)?.finish()?;
    let eig = diagonalize_sym_matrix(Uplo::Upper, &mut s.clone())?;
    info!("eigenvalues of s: {:?}", eig);

    let mut inv = s.clone();
    invert_gen_matrix(&mut inv)?;
    let check = mult_dgemm(&s, &inv)?;
    info!("s * s^-1 is identity: {}", check.is_identity());

    let mut q = Matrix::new(3, 3)?;
    set_matrix_random_orthogonal(&mut q, true)?;
    let qtq = mult_dgemm_atba(&q, &Matrix::identity(3)?)?;
    info!("q^T q is identity: {}", qtq.is_identity());

    let path = std::env::temp_dir().join("example-matrices.bin");
    write_matrices_to_binary(&path, [&ab, &s, &q])?;
    let back = read_matrices_from_binary(&path)?;
    info!("read {} matrices back, equal: {}", back.len(), back == [ab, s, q]);
    Ok(())
}
