use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use proxqp::{Dense, Dims, PrecondMode, QpData, Settings, Solver, Status};

fn kkt_residual(
    h: &DMatrix<f64>,
    g: &DVector<f64>,
    a: &DMatrix<f64>,
    c: &DMatrix<f64>,
    x: &DVector<f64>,
    y: &DVector<f64>,
    z: &DVector<f64>,
) -> f64 {
    let mut dual = h * x + g;
    if a.nrows() > 0 {
        dual += a.transpose() * y;
    }
    if c.nrows() > 0 {
        dual += c.transpose() * z;
    }
    dual.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

#[test]
fn unconstrained_matches_closed_form() {
    let dims = Dims::new(2, 0, 0);
    let mut solver = Solver::<f64, Dense>::new(dims, Settings::default());
    let data = QpData {
        h: Some(DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0])),
        g: Some(DVector::from_vec(vec![-2.0, -4.0])),
        ..Default::default()
    };
    solver.setup(data, PrecondMode::Execute).unwrap();
    let results = solver.solve().unwrap();
    assert_eq!(results.info.status, Status::Solved);
    assert_abs_diff_eq!(results.x[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(results.x[1], 2.0, epsilon = 1e-6);
}

#[test]
fn equality_only_matches_closed_form() {
    let dims = Dims::new(2, 1, 0);
    let mut solver = Solver::<f64, Dense>::new(dims, Settings::default());
    let data = QpData {
        h: Some(DMatrix::identity(2, 2)),
        a: Some(DMatrix::from_row_slice(1, 2, &[1.0, 1.0])),
        b: Some(DVector::from_vec(vec![1.0])),
        ..Default::default()
    };
    solver.setup(data, PrecondMode::Execute).unwrap();
    let results = solver.solve().unwrap();
    assert_eq!(results.info.status, Status::Solved);
    assert_abs_diff_eq!(results.x[0], 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(results.x[1], 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(results.y[0], -0.5, epsilon = 1e-6);
}

#[test]
fn box_constraint_clamps_at_upper_bound() {
    let dims = Dims::new(1, 0, 1);
    let mut solver = Solver::<f64, Dense>::new(dims, Settings::default());
    let data = QpData {
        h: Some(DMatrix::from_row_slice(1, 1, &[1.0])),
        g: Some(DVector::from_vec(vec![-1.0])),
        c: Some(DMatrix::from_row_slice(1, 1, &[1.0])),
        l: Some(DVector::from_vec(vec![0.0])),
        u: Some(DVector::from_vec(vec![0.3])),
        ..Default::default()
    };
    solver.setup(data, PrecondMode::Execute).unwrap();
    let results = solver.solve().unwrap();
    assert_eq!(results.info.status, Status::Solved);
    assert_abs_diff_eq!(results.x[0], 0.3, epsilon = 1e-6);
    assert!(results.z[0] > 0.0);
}

#[test]
fn box_constraint_inactive_reaches_unconstrained_minimum() {
    let dims = Dims::new(1, 0, 1);
    let mut solver = Solver::<f64, Dense>::new(dims, Settings::default());
    let data = QpData {
        h: Some(DMatrix::from_row_slice(1, 1, &[1.0])),
        g: Some(DVector::from_vec(vec![-1.0])),
        c: Some(DMatrix::from_row_slice(1, 1, &[1.0])),
        l: Some(DVector::from_vec(vec![-10.0])),
        u: Some(DVector::from_vec(vec![10.0])),
        ..Default::default()
    };
    solver.setup(data, PrecondMode::Execute).unwrap();
    let results = solver.solve().unwrap();
    assert_eq!(results.info.status, Status::Solved);
    assert_abs_diff_eq!(results.x[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(results.z[0], 0.0, epsilon = 1e-9);
}

#[test]
fn general_kkt_residual_is_small() {
    let h = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]);
    let g = DVector::from_vec(vec![1.0, 1.0]);
    let a = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
    let b = DVector::from_vec(vec![1.0]);
    let c = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
    let l = DVector::from_vec(vec![-10.0, -10.0]);
    let u = DVector::from_vec(vec![10.0, 10.0]);

    let dims = Dims::new(2, 1, 2);
    let mut solver = Solver::<f64, Dense>::new(dims, Settings::default());
    let data = QpData {
        h: Some(h.clone()),
        g: Some(g.clone()),
        a: Some(a.clone()),
        b: Some(b),
        c: Some(c.clone()),
        l: Some(l),
        u: Some(u),
    };
    solver.setup(data, PrecondMode::Execute).unwrap();
    let results = solver.solve().unwrap();
    assert_eq!(results.info.status, Status::Solved);

    let res = kkt_residual(&h, &g, &a, &c, &results.x, &results.y, &results.z);
    assert!(res < 1e-6, "kkt residual too large: {res}");
}

#[test]
fn warm_start_reuses_factorization_and_still_converges() {
    let dims = Dims::new(2, 0, 0);
    let mut solver = Solver::<f64, Dense>::new(dims, Settings::default());
    let data = QpData {
        h: Some(DMatrix::identity(2, 2)),
        g: Some(DVector::from_vec(vec![-1.0, -1.0])),
        ..Default::default()
    };
    solver.setup(data, PrecondMode::Execute).unwrap();
    let first = solver.solve().unwrap();
    assert_abs_diff_eq!(first.x[0], 1.0, epsilon = 1e-6);

    solver.warm_start(Some(first.x.clone()), None, None);
    let data2 = QpData {
        g: Some(DVector::from_vec(vec![-2.0, -2.0])),
        ..Default::default()
    };
    solver.update(data2, PrecondMode::Execute).unwrap();
    let second = solver.solve().unwrap();
    assert_eq!(second.info.status, Status::Solved);
    assert_abs_diff_eq!(second.x[0], 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(second.x[1], 2.0, epsilon = 1e-6);
}

#[cfg(feature = "sparse")]
#[test]
fn sparse_backend_matches_dense() {
    use proxqp::matrix::sparse::from_triplets;
    use proxqp::Sparse;

    let h_dense = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]);
    let g = DVector::from_vec(vec![-2.0, -4.0]);

    let dims = Dims::new(2, 0, 0);
    let mut dense_solver = Solver::<f64, Dense>::new(dims, Settings::default());
    let dense_data = QpData {
        h: Some(h_dense),
        g: Some(g.clone()),
        ..Default::default()
    };
    dense_solver.setup(dense_data, PrecondMode::Execute).unwrap();
    let dense_results = dense_solver.solve().unwrap();

    let h_sparse = from_triplets(2, 2, &[(0, 0, 2.0), (1, 1, 2.0)]);
    let mut sparse_solver = Solver::<f64, Sparse>::new(dims, Settings::default());
    let sparse_data = QpData {
        h: Some(h_sparse),
        g: Some(g),
        ..Default::default()
    };
    sparse_solver.setup(sparse_data, PrecondMode::Execute).unwrap();
    let sparse_results = sparse_solver.solve().unwrap();

    assert_abs_diff_eq!(dense_results.x[0], sparse_results.x[0], epsilon = 1e-6);
    assert_abs_diff_eq!(dense_results.x[1], sparse_results.x[1], epsilon = 1e-6);
}
